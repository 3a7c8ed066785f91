//! The location contract and its algebraic combinators.
//!
//! A [`Location`] stores content-addressed payloads behind a small
//! capability set: `read`, `write`, `contains`, `delete`, `touch`. The
//! combinators compose locations at runtime: [`Small`] gates writes by
//! payload size, [`Fanout`] spills horizontally across peers, and
//! [`Levels`] stacks tiers into a cache hierarchy with copy-on-read
//! promotion.

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod fanout;
mod level;
mod levels;
mod small;

pub use fanout::Fanout;
pub use level::Level;
pub use levels::Levels;
pub use small::Small;

use std::io::{self, Read};
use std::sync::Arc;

use cairn_core::digest::{HashAlgorithm, Key};
use cairn_core::error::StoreError;
use cairn_core::source::ByteSource;

/// Outcome of offering a payload to a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The payload is stored under the key (or already was: writes of
    /// content-addressed entries are idempotent).
    Accepted,
    /// The backing store is out of budget; a fanout advances to the next
    /// child on this.
    RejectedFull,
    /// The location does not accept new keys.
    RejectedReadonly,
    /// A configured predicate refused the payload.
    RejectedPolicy,
}

/// Result of a cheap existence probe.
///
/// `Unknown` is legal for backends where probing is expensive; callers
/// must fall back to `read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// The key is held here.
    Present,
    /// The key is not held here.
    Absent,
    /// The location cannot answer cheaply.
    Unknown,
}

/// Result of removing a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The entry existed and is gone.
    Removed,
    /// No entry was held under the key.
    Absent,
    /// The location does not accept deletions.
    RejectedReadonly,
}

/// A readable payload stream handed back from a location.
pub struct Payload {
    reader: Box<dyn Read + Send>,
    len: Option<u64>,
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload").field("len", &self.len).finish()
    }
}

impl Payload {
    /// Wrap a reader, with the payload size when known.
    pub fn new(reader: impl Read + Send + 'static, len: Option<u64>) -> Self {
        Self { reader: Box::new(reader), len }
    }

    /// Payload size in bytes, when the backend knows it.
    pub fn len(&self) -> Option<u64> {
        self.len
    }

    /// Whether the payload is empty, when the size is known.
    pub fn is_empty(&self) -> Option<bool> {
        self.len.map(|n| n == 0)
    }

    /// Unwrap into the underlying reader.
    pub fn into_reader(self) -> Box<dyn Read + Send> {
        self.reader
    }

    /// Drain the stream into memory.
    pub fn into_vec(mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.reader.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl Read for Payload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

/// A polymorphic storage location addressed by content digests.
///
/// Implementations must be safe for concurrent use; every operation is
/// streaming and re-entrant per key. Errors split into transient
/// (combinators move on to the next child) and fatal (propagated), per
/// [`StoreError::is_transient`].
pub trait Location: Send + Sync {
    /// Digest algorithm this location expects for its keys.
    fn algorithm(&self) -> HashAlgorithm;

    /// May keys be read?
    fn readable(&self) -> bool {
        true
    }

    /// May new keys be written?
    fn writable(&self) -> bool {
        true
    }

    /// Open a readable stream for `key`; `None` when the key is not held.
    fn read(&self, key: &Key) -> Result<Option<Payload>, StoreError>;

    /// Attempt to store the payload under `key`.
    fn write(&self, key: &Key, source: &dyn ByteSource) -> Result<WriteOutcome, StoreError>;

    /// Cheap existence probe.
    fn contains(&self, key: &Key) -> Result<Presence, StoreError>;

    /// Remove `key`.
    fn delete(&self, key: &Key) -> Result<DeleteOutcome, StoreError>;

    /// Refresh last-access metadata where supported; no-op otherwise.
    fn touch(&self, _key: &Key) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Verify that all children agree on one digest algorithm.
///
/// Mixing algorithms within a composition is a construction-time error.
pub fn common_algorithm<'a, I>(children: I) -> Result<HashAlgorithm, StoreError>
where
    I: IntoIterator<Item = &'a Arc<dyn Location>>,
{
    let mut algorithm = None;
    for child in children {
        match algorithm {
            None => algorithm = Some(child.algorithm()),
            Some(a) if a == child.algorithm() => {}
            Some(a) => {
                return Err(StoreError::Config(format!(
                    "children disagree on digest algorithm: {a} vs {}",
                    child.algorithm()
                )))
            }
        }
    }
    algorithm.ok_or_else(|| StoreError::Config("composition requires at least one child".into()))
}
