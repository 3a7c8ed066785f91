//! Tracing-backed sink for storage lifecycle events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hash_storage::observer::{StorageEvent, StorageObserver};

/// Event sink that logs through `tracing` and keeps running totals.
///
/// The handle is cheap to clone and all clones share the same counters,
/// so keep one clone around to read [`TracingStorageObserver::totals`]
/// after a storage handle has taken ownership of another.
#[derive(Clone, Default)]
pub struct TracingStorageObserver {
    write_bytes: Arc<AtomicU64>,
    read_bytes: Arc<AtomicU64>,
    corrupt_reads: Arc<AtomicU64>,
}

impl TracingStorageObserver {
    /// A sink with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Running totals: `(write_bytes, read_bytes, corrupt_reads)`.
    pub fn totals(&self) -> (u64, u64, u64) {
        (
            self.write_bytes.load(Ordering::Relaxed),
            self.read_bytes.load(Ordering::Relaxed),
            self.corrupt_reads.load(Ordering::Relaxed),
        )
    }
}

impl StorageObserver for TracingStorageObserver {
    fn record(&self, event: StorageEvent) {
        match event {
            StorageEvent::WriteAccepted { bytes } => {
                self.write_bytes.fetch_add(bytes, Ordering::Relaxed);
                tracing::info!(target: "cairn::storage", bytes, "write accepted");
            }
            StorageEvent::ReadVerified { bytes } => {
                self.read_bytes.fetch_add(bytes, Ordering::Relaxed);
                tracing::info!(target: "cairn::storage", bytes, "read verified");
            }
            StorageEvent::ReadCorrupt { key } => {
                self.corrupt_reads.fetch_add(1, Ordering::Relaxed);
                tracing::error!(target: "cairn::storage", key = %key, "read failed verification");
            }
            StorageEvent::Deleted { key } => {
                tracing::debug!(target: "cairn::storage", key = %key, "entry deleted");
            }
        }
    }
}
