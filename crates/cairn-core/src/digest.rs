//! Digest algorithms, streaming hashers, and content-addressed keys.
//!
//! A key is the digest of the payload bytes under one of the registered
//! algorithms. Its hex encoding doubles as the storage path: the first two
//! hex characters name the shard directory, the remainder the entry file.

use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use std::fmt;

use crate::error::StoreError;

/// Number of leading hex characters that form the shard directory.
pub const SHARD_HEX_LEN: usize = 2;

/// Digest algorithms known to the registry. SHA-256 is the primary
/// algorithm; the others exist so legacy keys stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-224 (28-byte digests).
    Sha224,
    /// SHA-256 (32-byte digests).
    Sha256,
    /// SHA-384 (48-byte digests).
    Sha384,
    /// SHA-512 (64-byte digests).
    Sha512,
}

impl HashAlgorithm {
    /// Every algorithm in the registry.
    pub const ALL: [Self; 4] = [Self::Sha224, Self::Sha256, Self::Sha384, Self::Sha512];

    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Digest length in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Look an algorithm up by its canonical name.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.name() == name)
    }

    /// Begin a streaming hash.
    pub fn hasher(self) -> Hasher {
        let inner = match self {
            Self::Sha224 => HasherInner::Sha224(sha2::Sha224::new()),
            Self::Sha256 => HasherInner::Sha256(sha2::Sha256::new()),
            Self::Sha384 => HasherInner::Sha384(sha2::Sha384::new()),
            Self::Sha512 => HasherInner::Sha512(sha2::Sha512::new()),
        };
        Hasher { algorithm: self, inner }
    }

    /// Hash a complete in-memory buffer into a key.
    pub fn digest_of(self, bytes: &[u8]) -> Key {
        let mut hasher = self.hasher();
        hasher.update(bytes);
        hasher.finalize()
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Streaming hasher for any registered algorithm.
pub struct Hasher {
    algorithm: HashAlgorithm,
    inner: HasherInner,
}

enum HasherInner {
    Sha224(sha2::Sha224),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

impl Hasher {
    /// Feed more payload bytes.
    pub fn update(&mut self, bytes: &[u8]) {
        match &mut self.inner {
            HasherInner::Sha224(h) => h.update(bytes),
            HasherInner::Sha256(h) => h.update(bytes),
            HasherInner::Sha384(h) => h.update(bytes),
            HasherInner::Sha512(h) => h.update(bytes),
        }
    }

    /// Finish the stream and produce the key.
    pub fn finalize(self) -> Key {
        let bytes = match self.inner {
            HasherInner::Sha224(h) => h.finalize().to_vec(),
            HasherInner::Sha256(h) => h.finalize().to_vec(),
            HasherInner::Sha384(h) => h.finalize().to_vec(),
            HasherInner::Sha512(h) => h.finalize().to_vec(),
        };
        Key { algorithm: self.algorithm, bytes }
    }
}

/// A content-addressed key: the digest of the payload it names.
///
/// Equality is byte-wise; keys under different algorithms never compare
/// equal because the digest lengths differ and the algorithm is part of
/// the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    algorithm: HashAlgorithm,
    bytes: Vec<u8>,
}

impl Key {
    /// Build a key from raw digest bytes, checking the length.
    pub fn from_bytes(algorithm: HashAlgorithm, bytes: Vec<u8>) -> Result<Self, StoreError> {
        if bytes.len() != algorithm.digest_len() {
            return Err(StoreError::Config(format!(
                "{} digest must be {} bytes, got {}",
                algorithm,
                algorithm.digest_len(),
                bytes.len()
            )));
        }
        Ok(Self { algorithm, bytes })
    }

    /// Parse a key from its lowercase hex encoding.
    pub fn from_hex(algorithm: HashAlgorithm, hex_digest: &str) -> Result<Self, StoreError> {
        let bytes = hex::decode(hex_digest)
            .map_err(|e| StoreError::Config(format!("invalid hex digest: {e}")))?;
        Self::from_bytes(algorithm, bytes)
    }

    /// Algorithm the digest was computed under.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Shard directory name: the first [`SHARD_HEX_LEN`] hex characters.
    pub fn shard(&self) -> String {
        self.to_hex()[..SHARD_HEX_LEN].to_string()
    }

    /// Entry file name: everything after the shard prefix.
    pub fn rest(&self) -> String {
        self.to_hex()[SHARD_HEX_LEN..].to_string()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        let key = HashAlgorithm::Sha256.digest_of(b"hello");
        assert_eq!(
            key.to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(key.shard(), "2c");
        assert_eq!(key.rest(), "f24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut hasher = HashAlgorithm::Sha512.hasher();
        hasher.update(b"hel");
        hasher.update(b"lo");
        assert_eq!(hasher.finalize(), HashAlgorithm::Sha512.digest_of(b"hello"));
    }

    #[test]
    fn hex_round_trip() {
        let key = HashAlgorithm::Sha256.digest_of(b"abc");
        let parsed = Key::from_hex(HashAlgorithm::Sha256, &key.to_hex()).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn registry_lookup() {
        assert_eq!(HashAlgorithm::by_name("sha256"), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::by_name("md5"), None);
        for a in HashAlgorithm::ALL {
            assert_eq!(a.digest_of(b"x").as_bytes().len(), a.digest_len());
        }
    }

    #[test]
    fn bad_lengths_are_config_errors() {
        let err = Key::from_bytes(HashAlgorithm::Sha256, vec![0u8; 20]).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
        let err = Key::from_hex(HashAlgorithm::Sha256, "zz").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    proptest::proptest! {
        #[test]
        fn chunked_hashing_is_split_invariant(
            data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..4096),
            split in 0usize..4096,
        ) {
            let split = split.min(data.len());
            let mut hasher = HashAlgorithm::Sha256.hasher();
            hasher.update(&data[..split]);
            hasher.update(&data[split..]);
            proptest::prop_assert_eq!(hasher.finalize(), HashAlgorithm::Sha256.digest_of(&data));
        }
    }
}
