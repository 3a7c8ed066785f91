//! Size-budget maintenance: sweeps and least-recently-used eviction.
//!
//! Eviction runs beside live traffic: it takes the same per-shard
//! advisory lock as writers, yields between deletions, and never touches
//! an entry accessed within the grace window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cairn_core::error::StoreError;

use crate::store::{now_epoch, DiskLocation, TEMP_MAX_AGE};

/// Fraction of the budget eviction drains down to.
const LOW_WATER_RATIO: f64 = 0.9;

/// How often a sleeping maintenance thread checks its stop flag.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Counts from one eviction pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EvictionReport {
    /// Entries considered.
    pub examined: usize,
    /// Entries deleted.
    pub evicted: usize,
    /// Payload bytes reclaimed.
    pub reclaimed_bytes: u64,
    /// Accounted bytes after the pass.
    pub used_bytes: u64,
}

/// Target usage for a store with the given budget.
pub fn low_water_mark(budget: u64) -> u64 {
    (budget as f64 * LOW_WATER_RATIO) as u64
}

/// One eviction pass over `location`.
///
/// Entries are ordered by last access, oldest first, and deleted until
/// usage drops to the low-water mark. A store without a size budget is
/// left untouched.
pub fn run_once(location: &DiskLocation) -> Result<EvictionReport, StoreError> {
    let mut report =
        EvictionReport { used_bytes: location.used_bytes(), ..EvictionReport::default() };
    let Some(budget) = location.config().max_size else {
        return Ok(report);
    };
    let low_water = low_water_mark(budget);
    if report.used_bytes <= low_water {
        return Ok(report);
    }

    let mut entries = location.entries()?;
    entries.sort_by(|a, b| a.last_access.total_cmp(&b.last_access));
    report.examined = entries.len();
    let cutoff = now_epoch() - location.config().grace_window().as_secs_f64();

    for entry in &entries {
        if location.used_bytes() <= low_water {
            break;
        }
        if entry.last_access >= cutoff {
            // Everything later in the ordering is younger still.
            continue;
        }
        match location.evict_entry(entry, cutoff) {
            Ok(Some(bytes)) => {
                report.evicted += 1;
                report.reclaimed_bytes += bytes;
                tracing::debug!(payload = %entry.payload.display(), bytes, "evicted entry");
            }
            Ok(None) => {}
            Err(e) if e.is_transient() => {
                tracing::debug!(payload = %entry.payload.display(), error = %e, "shard contended, skipping entry");
            }
            Err(e) => return Err(e),
        }
        thread::yield_now();
    }

    report.used_bytes = location.used_bytes();
    tracing::info!(
        evicted = report.evicted,
        reclaimed = report.reclaimed_bytes,
        used = report.used_bytes,
        budget,
        "eviction pass finished"
    );
    Ok(report)
}

/// Handle for a background maintenance thread; stops and joins on drop.
pub struct MaintenanceHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Signal the thread and wait for it to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run sweep and eviction passes every `interval` on a background thread.
pub fn spawn(location: Arc<DiskLocation>, interval: Duration) -> MaintenanceHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    let thread = thread::spawn(move || {
        while !flag.load(Ordering::SeqCst) {
            if let Err(e) = location.sweep(TEMP_MAX_AGE) {
                tracing::warn!(error = %e, "maintenance sweep failed");
            }
            if let Err(e) = run_once(&location) {
                tracing::warn!(error = %e, "eviction pass failed");
            }
            let mut slept = Duration::ZERO;
            while slept < interval && !flag.load(Ordering::SeqCst) {
                thread::sleep(STOP_POLL);
                slept += STOP_POLL;
            }
        }
    });
    MaintenanceHandle { stop, thread: Some(thread) }
}
