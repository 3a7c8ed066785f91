//! Vertical cache hierarchy with copy-on-read promotion.

use std::io::{self, Read};

use cairn_core::digest::{HashAlgorithm, Key};
use cairn_core::error::StoreError;
use cairn_core::source::{ByteSource, SpooledSource};

use crate::{common_algorithm, DeleteOutcome, Level, Location, Payload, Presence, WriteOutcome};

/// Ordered tiers, fastest first; the last tier is the source of truth.
///
/// Writes land in every write-gated tier, top-first, so the hierarchy is
/// strictly inclusive for new keys. Reads walk top to bottom and promote
/// a hit from a lower tier into the write-gated tiers above it.
///
/// Promotion runs synchronously after the caller closes the returned
/// payload stream: dropping the stream re-reads the hit tier into a spool
/// and copies the entry into every higher tier that does not already hold
/// it, best-effort, with failures logged. The caller therefore sees bytes
/// exactly as fast as a direct read from the hit tier.
pub struct Levels {
    tiers: Vec<Level>,
    algorithm: HashAlgorithm,
}

impl Levels {
    /// Compose `tiers` fastest-first. All tiers must share one digest
    /// algorithm.
    pub fn new(tiers: Vec<Level>) -> Result<Self, StoreError> {
        let algorithm = common_algorithm(tiers.iter().map(Level::location))?;
        Ok(Self { tiers, algorithm })
    }

    /// Convenience constructor for fully gated tiers.
    pub fn from_locations(
        locations: Vec<std::sync::Arc<dyn Location>>,
    ) -> Result<Self, StoreError> {
        Self::new(locations.into_iter().map(Level::open).collect())
    }

    /// The tiers, fastest first.
    pub fn tiers(&self) -> &[Level] {
        &self.tiers
    }
}

impl Location for Levels {
    fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn readable(&self) -> bool {
        self.tiers.iter().any(Level::can_read)
    }

    fn writable(&self) -> bool {
        self.tiers.iter().any(Level::can_write)
    }

    fn read(&self, key: &Key) -> Result<Option<Payload>, StoreError> {
        let mut transients = Vec::new();
        let mut saw_absent = false;
        for (i, tier) in self.tiers.iter().enumerate() {
            if !tier.can_read() {
                continue;
            }
            match tier.location().read(key) {
                Ok(Some(payload)) => {
                    let above: Vec<Level> =
                        self.tiers[..i].iter().filter(|t| t.can_write()).cloned().collect();
                    if above.is_empty() {
                        return Ok(Some(payload));
                    }
                    let len = payload.len();
                    let reader = PromotingReader {
                        inner: payload.into_reader(),
                        job: Some(PromotionJob { key: key.clone(), source: tier.clone(), above }),
                    };
                    return Ok(Some(Payload::new(reader, len)));
                }
                Ok(None) => saw_absent = true,
                Err(e) if e.is_transient() => {
                    tracing::debug!(key = %key, tier = i, error = %e, "tier read failed transiently");
                    transients.push(e);
                }
                Err(e) => return Err(e),
            }
        }
        if saw_absent || transients.is_empty() {
            Ok(None)
        } else {
            Err(StoreError::aggregate_transient(transients))
        }
    }

    fn write(&self, key: &Key, source: &dyn ByteSource) -> Result<WriteOutcome, StoreError> {
        let mut accepted = false;
        let mut saw_writable = false;
        for (i, tier) in self.tiers.iter().enumerate() {
            if !tier.can_write() {
                continue;
            }
            saw_writable = true;
            match tier.location().write(key, source)? {
                WriteOutcome::Accepted => accepted = true,
                outcome => {
                    tracing::debug!(key = %key, tier = i, ?outcome, "tier rejected write");
                }
            }
        }
        if accepted {
            Ok(WriteOutcome::Accepted)
        } else if saw_writable {
            Ok(WriteOutcome::RejectedFull)
        } else {
            Ok(WriteOutcome::RejectedReadonly)
        }
    }

    fn contains(&self, key: &Key) -> Result<Presence, StoreError> {
        let mut unknown = false;
        for tier in &self.tiers {
            match tier.location().contains(key) {
                Ok(Presence::Present) => return Ok(Presence::Present),
                Ok(Presence::Absent) => {}
                Ok(Presence::Unknown) => unknown = true,
                Err(e) if e.is_transient() => unknown = true,
                Err(e) => return Err(e),
            }
        }
        if unknown {
            Ok(Presence::Unknown)
        } else {
            Ok(Presence::Absent)
        }
    }

    fn delete(&self, key: &Key) -> Result<DeleteOutcome, StoreError> {
        let mut removed = false;
        let mut all_readonly = true;
        for tier in &self.tiers {
            match tier.location().delete(key) {
                Ok(DeleteOutcome::Removed) => {
                    removed = true;
                    all_readonly = false;
                }
                Ok(DeleteOutcome::Absent) => all_readonly = false,
                Ok(DeleteOutcome::RejectedReadonly) => {}
                Err(e) if e.is_transient() => {
                    all_readonly = false;
                    tracing::debug!(key = %key, error = %e, "tier delete failed transiently");
                }
                Err(e) => return Err(e),
            }
        }
        if removed {
            Ok(DeleteOutcome::Removed)
        } else if all_readonly {
            Ok(DeleteOutcome::RejectedReadonly)
        } else {
            Ok(DeleteOutcome::Absent)
        }
    }

    fn touch(&self, key: &Key) -> Result<(), StoreError> {
        for tier in &self.tiers {
            if let Err(e) = tier.location().touch(key) {
                tracing::debug!(key = %key, error = %e, "touch failed on tier");
            }
        }
        Ok(())
    }
}

/// Copy an entry from its hit tier into the write-gated tiers above it.
struct PromotionJob {
    key: Key,
    source: Level,
    above: Vec<Level>,
}

impl PromotionJob {
    fn run(self) {
        let payload = match self.source.location().read(&self.key) {
            Ok(Some(p)) => p,
            Ok(None) => {
                tracing::debug!(key = %self.key, "entry vanished before promotion");
                return;
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "promotion re-read failed");
                return;
            }
        };
        let mut reader = payload.into_reader();
        let spool = match SpooledSource::drain(&std::env::temp_dir(), &mut reader) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "promotion spool failed");
                return;
            }
        };
        for tier in &self.above {
            match tier.location().contains(&self.key) {
                Ok(Presence::Present) => continue,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(key = %self.key, error = %e, "promotion probe failed");
                }
            }
            match tier.location().write(&self.key, &spool) {
                Ok(WriteOutcome::Accepted) => {
                    tracing::debug!(key = %self.key, "promoted entry into higher tier");
                }
                Ok(outcome) => {
                    tracing::debug!(key = %self.key, ?outcome, "tier declined promotion");
                }
                Err(e) => {
                    tracing::warn!(key = %self.key, error = %e, "promotion write failed");
                }
            }
        }
    }
}

/// Payload reader that triggers promotion when the caller closes it.
struct PromotingReader {
    inner: Box<dyn Read + Send>,
    job: Option<PromotionJob>,
}

impl Read for PromotingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Drop for PromotingReader {
    fn drop(&mut self) {
        if let Some(job) = self.job.take() {
            job.run();
        }
    }
}
