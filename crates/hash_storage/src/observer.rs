//! Storage lifecycle events.
//!
//! A [`crate::HashKeyStorage`] handle may be given one event sink at
//! construction. Events are cheap fire-and-forget notifications emitted
//! after the fact; sinks decide what to do with them (count, log,
//! export). There is no process-wide registry: each handle carries its
//! own sink, so two storages in one process can report to different
//! places.

use cairn_core::digest::Key;

/// A notification emitted by a storage handle.
#[derive(Debug, Clone)]
pub enum StorageEvent {
    /// A payload was accepted by the root location.
    WriteAccepted {
        /// Payload size in bytes.
        bytes: u64,
    },
    /// A read drained fully and its digest matched the key.
    ReadVerified {
        /// Bytes delivered to the reader.
        bytes: u64,
    },
    /// A read drained fully but the digest did not match.
    ReadCorrupt {
        /// The key the payload was expected to hash to.
        key: Key,
    },
    /// An entry was removed from the root location.
    Deleted {
        /// The removed key.
        key: Key,
    },
}

/// Sink for [`StorageEvent`]s.
pub trait StorageObserver: Send + Sync {
    /// Deliver one event. Called inline from storage operations, so
    /// implementations must not block.
    fn record(&self, event: StorageEvent);
}
