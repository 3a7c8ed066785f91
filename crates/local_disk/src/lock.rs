//! Per-shard advisory locks shared by writers and the sweeper.
//!
//! The lock lives in a `.lock` file inside the shard directory and is
//! honored by cooperating processes through the OS advisory lock, so
//! several processes may share one store root.

use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use cairn_core::error::StoreError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Exclusive lock over one shard directory; released on drop.
#[derive(Debug)]
pub(crate) struct ShardLock {
    file: fs::File,
}

impl ShardLock {
    /// Block until the shard lock is held, bounded by `wait`.
    ///
    /// Expiry of the bound surfaces as a transient error so callers may
    /// retry.
    pub(crate) fn acquire(shard_dir: &Path, wait: Duration) -> Result<Self, StoreError> {
        fs::create_dir_all(shard_dir)?;
        let path = shard_dir.join(".lock");
        let file = fs::OpenOptions::new().create(true).write(true).open(&path)?;
        let deadline = Instant::now() + wait;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file }),
                Err(e) if is_contended(&e) => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::Transient(format!(
                            "lock wait on {} exceeded {wait:?}",
                            path.display()
                        )));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for ShardLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
