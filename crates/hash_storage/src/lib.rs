//! Hash-keyed storage over a root location.
//!
//! [`HashKeyStorage`] owns a single root [`Location`] (usually a
//! combinator composition) and keeps the content-addressed contract
//! honest on both sides: a write hashes the payload and stores it under
//! the resulting key, a read hands back a scoped handle whose bytes are
//! verified against the key.
//!
//! Writes use the hash-first strategy: the source is streamed through the
//! hasher into a replayable spool, then offered to the root location once
//! the key is known. Reads verify lazily through [`ReadGuard::finish`] or
//! eagerly through [`HashKeyStorage::read_to_vec`]. A handle may carry an
//! [`observer::StorageObserver`] sink that is told about accepted writes,
//! verified or corrupt reads, and deletions.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod observer;

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cairn_core::digest::{HashAlgorithm, Hasher, Key};
use cairn_core::error::StoreError;
use cairn_core::source::{ByteSource, BytesSource, FileSource, SpooledSource};
use locations::{DeleteOutcome, Location, Payload, Presence, WriteOutcome};

use crate::observer::{StorageEvent, StorageObserver};

const CHUNK_SIZE: usize = 64 * 1024;

/// Write-by-hash, read-by-hash façade over a root location.
pub struct HashKeyStorage {
    root: Arc<dyn Location>,
    algorithm: HashAlgorithm,
    legacy: Vec<HashAlgorithm>,
    spool_dir: PathBuf,
    sink: Option<Arc<dyn StorageObserver>>,
}

impl HashKeyStorage {
    /// Build over a root location; writes use the location's algorithm.
    pub fn new(root: Arc<dyn Location>) -> Self {
        let algorithm = root.algorithm();
        Self {
            root,
            algorithm,
            legacy: Vec::new(),
            spool_dir: std::env::temp_dir(),
            sink: None,
        }
    }

    /// Accept reads keyed under additional legacy algorithms.
    pub fn with_legacy(mut self, algorithms: impl IntoIterator<Item = HashAlgorithm>) -> Self {
        self.legacy.extend(algorithms);
        self
    }

    /// Directory for write-side spool files.
    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = dir.into();
        self
    }

    /// Report lifecycle events to `sink`.
    pub fn with_observer(mut self, sink: Arc<dyn StorageObserver>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The primary algorithm every write uses.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn emit(&self, event: StorageEvent) {
        if let Some(sink) = &self.sink {
            sink.record(event);
        }
    }

    fn accepted(&self, key: &Key) -> Result<(), StoreError> {
        let algorithm = key.algorithm();
        if algorithm == self.algorithm || self.legacy.contains(&algorithm) {
            Ok(())
        } else {
            Err(StoreError::Config(format!("keys under {algorithm} are not accepted")))
        }
    }

    /// Hash and store in-memory bytes, returning their key.
    pub fn write_bytes(&self, bytes: &[u8]) -> Result<Key, StoreError> {
        let key = self.algorithm.digest_of(bytes);
        self.offer(key, &BytesSource::new(bytes.to_vec()))
    }

    /// Hash and store the contents of a file, returning its key.
    ///
    /// The file is hashed in a first pass and handed to the location as a
    /// replayable source; a file that mutates in between fails the
    /// location's own digest verification.
    pub fn write_path(&self, path: &Path) -> Result<Key, StoreError> {
        let mut file = fs::File::open(path)?;
        let mut hasher = self.algorithm.hasher();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        self.offer(hasher.finalize(), &FileSource::new(path))
    }

    /// Hash and store a one-shot stream, returning its key.
    ///
    /// The stream is spooled to a local temp file while hashing; the
    /// spool is removed once the location has taken the payload.
    pub fn write_reader(&self, reader: &mut dyn Read) -> Result<Key, StoreError> {
        let mut hashing = HashingReader { inner: reader, hasher: self.algorithm.hasher() };
        let spool = SpooledSource::drain(&self.spool_dir, &mut hashing)?;
        self.offer(hashing.hasher.finalize(), &spool)
    }

    fn offer(&self, key: Key, source: &dyn ByteSource) -> Result<Key, StoreError> {
        let bytes = source.len().unwrap_or(0);
        match self.root.write(&key, source)? {
            WriteOutcome::Accepted => {
                self.emit(StorageEvent::WriteAccepted { bytes });
                tracing::debug!(key = %key, bytes, "payload stored");
                Ok(key)
            }
            WriteOutcome::RejectedFull | WriteOutcome::RejectedPolicy => {
                Err(StoreError::StorageFull)
            }
            WriteOutcome::RejectedReadonly => {
                Err(StoreError::Permission("root location is read-only".into()))
            }
        }
    }

    /// Open a scoped, verified read of `key`.
    ///
    /// The handle hashes bytes as they flow; [`ReadGuard::finish`] drains
    /// the remainder and verifies, signalling corruption on mismatch.
    /// Dropping the handle without finishing skips verification but still
    /// releases every resource.
    pub fn read(&self, key: &Key) -> Result<ReadGuard, StoreError> {
        self.accepted(key)?;
        match self.root.read(key)? {
            Some(payload) => Ok(ReadGuard::new(key.clone(), payload, self.sink.clone())),
            None => Err(StoreError::NotFound),
        }
    }

    /// Read and verify the full payload into memory.
    ///
    /// Verification is eager: a corrupt payload surfaces as
    /// [`StoreError::DigestMismatch`] and no bytes are returned.
    pub fn read_to_vec(&self, key: &Key) -> Result<Vec<u8>, StoreError> {
        let mut guard = self.read(key)?;
        let mut out = Vec::new();
        guard.read_to_end(&mut out)?;
        guard.verify()?;
        Ok(out)
    }

    /// Cheap existence probe against the root location.
    pub fn contains(&self, key: &Key) -> Result<Presence, StoreError> {
        self.accepted(key)?;
        self.root.contains(key)
    }

    /// Remove `key` from the root location.
    pub fn delete(&self, key: &Key) -> Result<DeleteOutcome, StoreError> {
        self.accepted(key)?;
        let outcome = self.root.delete(key)?;
        if outcome == DeleteOutcome::Removed {
            self.emit(StorageEvent::Deleted { key: key.clone() });
        }
        Ok(outcome)
    }

    /// Refresh last-access metadata for `key` where supported.
    pub fn touch(&self, key: &Key) -> Result<(), StoreError> {
        self.accepted(key)?;
        self.root.touch(key)
    }
}

struct HashingReader<'a> {
    inner: &'a mut dyn Read,
    hasher: Hasher,
}

impl Read for HashingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Scoped readable handle that verifies content against its key.
///
/// Implements [`Read`]; bytes are hashed as they flow through. Call
/// [`ReadGuard::finish`] to close the handle with verification. Dropping
/// without finishing releases the stream and performs no verification.
pub struct ReadGuard {
    key: Key,
    payload: Payload,
    hasher: Option<Hasher>,
    seen: u64,
    sink: Option<Arc<dyn StorageObserver>>,
}

impl ReadGuard {
    fn new(key: Key, payload: Payload, sink: Option<Arc<dyn StorageObserver>>) -> Self {
        let hasher = Some(key.algorithm().hasher());
        Self { key, payload, hasher, seen: 0, sink }
    }

    /// Payload size in bytes, when the backend knows it.
    pub fn len(&self) -> Option<u64> {
        self.payload.len()
    }

    /// Whether the payload is empty, when the size is known.
    pub fn is_empty(&self) -> Option<bool> {
        self.payload.is_empty()
    }

    /// Drain any remaining bytes and verify the digest.
    ///
    /// A mismatch surfaces as [`StoreError::Corruption`]: the caller may
    /// already have consumed the bad bytes.
    pub fn finish(mut self) -> Result<(), StoreError> {
        self.verify().map_err(|e| match e {
            StoreError::DigestMismatch { expected, actual } => StoreError::Corruption(
                format!("payload for {expected} hashed to {actual}"),
            ),
            other => other,
        })
    }

    fn emit(&self, event: StorageEvent) {
        if let Some(sink) = &self.sink {
            sink.record(event);
        }
    }

    /// Drain and check the digest, reporting a mismatch as such.
    fn verify(&mut self) -> Result<(), StoreError> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = self.payload.read(&mut buf)?;
            if n == 0 {
                break;
            }
            if let Some(h) = self.hasher.as_mut() {
                h.update(&buf[..n]);
            }
            self.seen += n as u64;
        }
        let Some(hasher) = self.hasher.take() else {
            return Ok(());
        };
        let actual = hasher.finalize();
        if actual == self.key {
            self.emit(StorageEvent::ReadVerified { bytes: self.seen });
            Ok(())
        } else {
            self.emit(StorageEvent::ReadCorrupt { key: self.key.clone() });
            Err(StoreError::DigestMismatch {
                expected: self.key.to_hex(),
                actual: actual.to_hex(),
            })
        }
    }
}

impl Read for ReadGuard {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.payload.read(buf)?;
        if let Some(h) = self.hasher.as_mut() {
            h.update(&buf[..n]);
        }
        self.seen += n as u64;
        Ok(n)
    }
}
