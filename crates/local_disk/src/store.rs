//! The disk-backed location and its concurrent-writer protocol.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use cairn_core::digest::{HashAlgorithm, Key, SHARD_HEX_LEN};
use cairn_core::error::StoreError;
use cairn_core::source::ByteSource;
use locations::{DeleteOutcome, Location, Payload, Presence, WriteOutcome};

use crate::config::DiskConfig;
use crate::lock::ShardLock;
use crate::{CONFIG_FILE, TMP_DIR};

const CHUNK_SIZE: usize = 64 * 1024;
const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);

/// Age past which an abandoned temp file is reclaimed by the sweep.
pub(crate) const TEMP_MAX_AGE: Duration = Duration::from_secs(3600);

/// Content-addressed directory on a local filesystem.
///
/// Writers publish entries with a temp-then-rename protocol serialized by
/// a per-shard advisory lock; readers open payload files without any
/// coordination because payloads are never mutated in place. Every
/// successful read refreshes the entry's `.time` metadata, which the
/// eviction pass in [`crate::maintenance`] orders entries by.
#[derive(Debug)]
pub struct DiskLocation {
    root: PathBuf,
    config: DiskConfig,
    used_bytes: AtomicU64,
    lock_wait: Duration,
    writable: bool,
}

/// Counts from a startup or maintenance sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Abandoned `.tmp` files removed.
    pub stale_temps: usize,
    /// `.time` files without a payload removed.
    pub orphan_meta: usize,
}

impl DiskLocation {
    /// Open an existing store rooted at `root`.
    ///
    /// The root and its `config.yml` must already exist; construction
    /// sweeps stale temp files and scans current usage.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StoreError::Config(format!("missing store root {}", root.display())));
        }
        let config = DiskConfig::load(&root.join(CONFIG_FILE))?;
        Self::finish_open(root, config)
    }

    /// Create a store at `root`, or open it if one already exists.
    ///
    /// An existing store must agree on the digest algorithm; the budgets
    /// of `config` are persisted as the new authoritative values.
    pub fn init(root: impl Into<PathBuf>, config: DiskConfig) -> Result<Self, StoreError> {
        let root = root.into();
        config.validate()?;
        fs::create_dir_all(&root)?;
        let config_path = root.join(CONFIG_FILE);
        if config_path.exists() {
            let existing = DiskConfig::load(&config_path)?;
            if existing.algorithm() != config.algorithm() {
                return Err(StoreError::Config(format!(
                    "store at {} uses {}, requested {}",
                    root.display(),
                    existing.algorithm(),
                    config.algorithm()
                )));
            }
        }
        config.store(&config_path)?;
        Self::finish_open(root, config)
    }

    fn finish_open(root: PathBuf, config: DiskConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(root.join(TMP_DIR))?;
        let location = Self {
            root,
            config,
            used_bytes: AtomicU64::new(0),
            lock_wait: DEFAULT_LOCK_WAIT,
            writable: true,
        };
        let report = location.sweep(TEMP_MAX_AGE)?;
        if report.stale_temps > 0 || report.orphan_meta > 0 {
            tracing::info!(
                root = %location.root.display(),
                stale_temps = report.stale_temps,
                orphan_meta = report.orphan_meta,
                "startup sweep reclaimed artifacts"
            );
        }
        location.used_bytes.store(location.scan_used()?, Ordering::SeqCst);
        Ok(location)
    }

    /// Refuse writes and deletions through this handle.
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Bound the wait for a contended shard lock.
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// The store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The persisted configuration.
    pub fn config(&self) -> &DiskConfig {
        &self.config
    }

    /// Currently accounted payload bytes.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::SeqCst)
    }

    fn shard_dir(&self, key: &Key) -> PathBuf {
        self.root.join(key.shard())
    }

    fn payload_path(&self, key: &Key) -> PathBuf {
        self.shard_dir(key).join(key.rest())
    }

    fn meta_path(&self, key: &Key) -> PathBuf {
        self.shard_dir(key).join(format!("{}.time", key.rest()))
    }

    fn write_meta(&self, key: &Key) -> io::Result<()> {
        write_stamp(&self.meta_path(key))
    }

    /// Remove stale temp files and orphaned metadata.
    ///
    /// `max_age` bounds how fresh a temp file may be and still be
    /// reclaimed; pass [`Duration::ZERO`] to purge everything in `.tmp`.
    pub fn sweep(&self, max_age: Duration) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();
        let now = SystemTime::now();
        let tmp_dir = self.root.join(TMP_DIR);
        for entry in fs::read_dir(&tmp_dir)? {
            let path = entry?.path();
            let stale = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|mtime| now.duration_since(mtime).ok())
                .is_some_and(|age| age >= max_age);
            if stale && fs::remove_file(&path).is_ok() {
                report.stale_temps += 1;
            }
        }
        for shard in self.shard_dirs()? {
            for entry in fs::read_dir(&shard)? {
                let path = entry?.path();
                if path.extension().is_some_and(|e| e == "time") {
                    let payload = path.with_extension("");
                    if !payload.exists() && fs::remove_file(&path).is_ok() {
                        report.orphan_meta += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    fn shard_dirs(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() && is_shard_name(&path) {
                out.push(path);
            }
        }
        Ok(out)
    }

    fn scan_used(&self) -> Result<u64, StoreError> {
        let mut used = 0u64;
        for shard in self.shard_dirs()? {
            for entry in fs::read_dir(&shard)? {
                let entry = entry?;
                let path = entry.path();
                if is_payload_file(&path) {
                    used += entry.metadata()?.len();
                }
            }
        }
        Ok(used)
    }

    /// Enumerate entries with their last-access stamps for eviction.
    pub(crate) fn entries(&self) -> Result<Vec<EntryInfo>, StoreError> {
        let mut out = Vec::new();
        for shard in self.shard_dirs()? {
            for entry in fs::read_dir(&shard)? {
                let entry = entry?;
                let path = entry.path();
                if !is_payload_file(&path) {
                    continue;
                }
                let meta = sibling_meta_path(&path);
                let last_access = read_stamp(&meta)
                    .or_else(|| file_mtime_epoch(&path))
                    .unwrap_or(0.0);
                out.push(EntryInfo {
                    shard: shard.clone(),
                    payload: path,
                    meta,
                    size: entry.metadata()?.len(),
                    last_access,
                });
            }
        }
        Ok(out)
    }

    /// Remove one entry under the shard lock unless it was accessed at or
    /// after `cutoff` (POSIX seconds). Returns the bytes reclaimed.
    pub(crate) fn evict_entry(
        &self,
        entry: &EntryInfo,
        cutoff: f64,
    ) -> Result<Option<u64>, StoreError> {
        let _lock = ShardLock::acquire(&entry.shard, self.lock_wait)?;
        if !entry.payload.exists() {
            return Ok(None);
        }
        let last_access = read_stamp(&entry.meta)
            .or_else(|| file_mtime_epoch(&entry.payload))
            .unwrap_or(0.0);
        if last_access >= cutoff {
            return Ok(None);
        }
        let size = fs::metadata(&entry.payload)?.len();
        fs::remove_file(&entry.payload)?;
        let _ = fs::remove_file(&entry.meta);
        self.sub_used(size);
        Ok(Some(size))
    }

    fn sub_used(&self, n: u64) {
        let _ = self.used_bytes.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
            Some(used.saturating_sub(n))
        });
    }

    /// Stream the source into a temp file while verifying its digest.
    fn spool_verified(
        &self,
        key: &Key,
        source: &dyn ByteSource,
        tmp_path: &Path,
    ) -> Result<u64, StoreError> {
        let mut reader = source.open()?;
        let mut file = fs::OpenOptions::new().write(true).create_new(true).open(tmp_path)?;
        let mut hasher = key.algorithm().hasher();
        let mut written = 0u64;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n])?;
            written += n as u64;
        }
        file.sync_all()?;
        let actual = hasher.finalize();
        if actual != *key {
            return Err(StoreError::DigestMismatch {
                expected: key.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(written)
    }

    fn over_budget(&self, incoming: u64) -> bool {
        if let Some(budget) = self.config.max_size {
            let used = self.used_bytes();
            if used.saturating_add(incoming) > budget {
                tracing::debug!(used, incoming, budget, "size budget exhausted");
                return true;
            }
        }
        if let Some(reserve) = self.config.free_disk_size {
            if let Ok(available) = fs2::available_space(&self.root) {
                if available.saturating_sub(incoming) < reserve {
                    tracing::debug!(available, incoming, reserve, "free-disk reserve exhausted");
                    return true;
                }
            }
        }
        false
    }
}

impl Location for DiskLocation {
    fn algorithm(&self) -> HashAlgorithm {
        self.config.algorithm()
    }

    fn writable(&self) -> bool {
        self.writable
    }

    fn read(&self, key: &Key) -> Result<Option<Payload>, StoreError> {
        let path = self.payload_path(key);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(StoreError::Permission(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata().ok().map(|m| m.len());
        if let Err(e) = self.write_meta(key) {
            tracing::debug!(key = %key, error = %e, "last-access refresh failed");
        }
        Ok(Some(Payload::new(file, len)))
    }

    fn write(&self, key: &Key, source: &dyn ByteSource) -> Result<WriteOutcome, StoreError> {
        if !self.writable {
            return Ok(WriteOutcome::RejectedReadonly);
        }
        if key.algorithm() != self.algorithm() {
            return Err(StoreError::Config(format!(
                "store expects {} keys, got {}",
                self.algorithm(),
                key.algorithm()
            )));
        }
        let target = self.payload_path(key);
        if target.exists() {
            return Ok(WriteOutcome::Accepted);
        }

        let tmp_path = self.root.join(TMP_DIR).join(Uuid::new_v4().to_string());
        let incoming = match self.spool_verified(key, source, &tmp_path) {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        let lock = match ShardLock::acquire(&self.shard_dir(key), self.lock_wait) {
            Ok(lock) => lock,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        // Double-checked insertion: another writer may have published the
        // entry while this one was spooling.
        if target.exists() {
            let _ = fs::remove_file(&tmp_path);
            return Ok(WriteOutcome::Accepted);
        }

        if self.over_budget(incoming) {
            let _ = fs::remove_file(&tmp_path);
            return Ok(WriteOutcome::RejectedFull);
        }

        if let Err(e) = fs::rename(&tmp_path, &target) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        if let Ok(dir) = fs::File::open(self.shard_dir(key)) {
            let _ = dir.sync_all();
        }
        if let Err(e) = self.write_meta(key) {
            tracing::debug!(key = %key, error = %e, "metadata init failed");
        }
        self.used_bytes.fetch_add(incoming, Ordering::SeqCst);
        drop(lock);
        tracing::debug!(key = %key, bytes = incoming, "stored payload");
        Ok(WriteOutcome::Accepted)
    }

    fn contains(&self, key: &Key) -> Result<Presence, StoreError> {
        if self.payload_path(key).exists() {
            Ok(Presence::Present)
        } else {
            Ok(Presence::Absent)
        }
    }

    fn delete(&self, key: &Key) -> Result<DeleteOutcome, StoreError> {
        if !self.writable {
            return Ok(DeleteOutcome::RejectedReadonly);
        }
        let target = self.payload_path(key);
        if !target.exists() {
            return Ok(DeleteOutcome::Absent);
        }
        let _lock = ShardLock::acquire(&self.shard_dir(key), self.lock_wait)?;
        let size = fs::metadata(&target).map(|m| m.len()).unwrap_or(0);
        match fs::remove_file(&target) {
            Ok(()) => {
                let _ = fs::remove_file(self.meta_path(key));
                self.sub_used(size);
                Ok(DeleteOutcome::Removed)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DeleteOutcome::Absent),
            Err(e) => Err(e.into()),
        }
    }

    fn touch(&self, key: &Key) -> Result<(), StoreError> {
        if self.payload_path(key).exists() {
            if let Err(e) = self.write_meta(key) {
                tracing::debug!(key = %key, error = %e, "touch failed");
            }
        }
        Ok(())
    }
}

/// Entry snapshot used by the eviction pass.
pub(crate) struct EntryInfo {
    pub shard: PathBuf,
    pub payload: PathBuf,
    pub meta: PathBuf,
    pub size: u64,
    pub last_access: f64,
}

fn is_shard_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.len() == SHARD_HEX_LEN && n.bytes().all(|b| b.is_ascii_hexdigit()))
}

fn is_payload_file(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n != ".lock" && !n.ends_with(".time"))
}

fn sibling_meta_path(payload: &Path) -> PathBuf {
    let mut name = payload.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".time");
    payload.with_file_name(name)
}

/// Write the current time as textual POSIX seconds with microsecond
/// precision, the format shared with remote layouts.
fn write_stamp(path: &Path) -> io::Result<()> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    fs::write(path, format!("{}.{:06}\n", now.as_secs(), now.subsec_micros()))
}

fn read_stamp(path: &Path) -> Option<f64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn file_mtime_epoch(path: &Path) -> Option<f64> {
    let mtime = fs::metadata(path).ok()?.modified().ok()?;
    Some(mtime.duration_since(UNIX_EPOCH).ok()?.as_secs_f64())
}

/// Current time in POSIX seconds, for eviction cutoffs.
pub(crate) fn now_epoch() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}
