//! Horizontal spill across peer locations.

use std::sync::Arc;

use cairn_core::digest::{HashAlgorithm, Key};
use cairn_core::error::StoreError;
use cairn_core::source::ByteSource;

use crate::{common_algorithm, DeleteOutcome, Location, Payload, Presence, WriteOutcome};

/// An ordered list of peers; each newly written key lands in exactly one
/// child, the first (in declared order) that accepts it.
///
/// Reads consult children in the same order and return the first hit.
/// Transient child failures are collected and only surface when no child
/// could answer; a mix of misses and transient failures reads as a miss.
pub struct Fanout {
    children: Vec<Arc<dyn Location>>,
    algorithm: HashAlgorithm,
}

impl Fanout {
    /// Compose `children` in spill order. All children must share one
    /// digest algorithm.
    pub fn new(children: Vec<Arc<dyn Location>>) -> Result<Self, StoreError> {
        let algorithm = common_algorithm(&children)?;
        Ok(Self { children, algorithm })
    }

    /// The peers, in spill order.
    pub fn children(&self) -> &[Arc<dyn Location>] {
        &self.children
    }
}

impl Location for Fanout {
    fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn readable(&self) -> bool {
        self.children.iter().any(|c| c.readable())
    }

    fn writable(&self) -> bool {
        self.children.iter().any(|c| c.writable())
    }

    fn read(&self, key: &Key) -> Result<Option<Payload>, StoreError> {
        let mut transients = Vec::new();
        let mut saw_absent = false;
        for child in &self.children {
            if !child.readable() {
                continue;
            }
            match child.read(key) {
                Ok(Some(payload)) => return Ok(Some(payload)),
                Ok(None) => saw_absent = true,
                Err(e) if e.is_transient() => {
                    tracing::debug!(key = %key, error = %e, "child read failed transiently");
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
        let mut transients = Vec::new();
        for child in &self.children {
            match child.write(key, source) {
                Ok(WriteOutcome::Accepted) => return Ok(WriteOutcome::Accepted),
                Ok(outcome) => {
                    tracing::debug!(key = %key, ?outcome, "child rejected write, spilling to next");
                }
                Err(e) if e.is_transient() => {
                    tracing::debug!(key = %key, error = %e, "child write failed transiently, spilling to next");
                    transients.push(e);
                }
                Err(e) => return Err(e),
            }
        }
        if transients.is_empty() {
            Ok(WriteOutcome::RejectedFull)
        } else {
            Err(StoreError::aggregate_transient(transients))
        }
    }

    fn contains(&self, key: &Key) -> Result<Presence, StoreError> {
        let mut unknown = false;
        for child in &self.children {
            match child.contains(key) {
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
        let mut transients = Vec::new();
        for child in &self.children {
            match child.delete(key) {
                Ok(DeleteOutcome::Removed) => {
                    removed = true;
                    all_readonly = false;
                }
                Ok(DeleteOutcome::Absent) => all_readonly = false,
                Ok(DeleteOutcome::RejectedReadonly) => {}
                Err(e) if e.is_transient() => {
                    all_readonly = false;
                    transients.push(e);
                }
                Err(e) => return Err(e),
            }
        }
        if removed {
            Ok(DeleteOutcome::Removed)
        } else if !transients.is_empty() {
            Err(StoreError::aggregate_transient(transients))
        } else if all_readonly {
            Ok(DeleteOutcome::RejectedReadonly)
        } else {
            Ok(DeleteOutcome::Absent)
        }
    }

    fn touch(&self, key: &Key) -> Result<(), StoreError> {
        for child in &self.children {
            if let Err(e) = child.touch(key) {
                tracing::debug!(key = %key, error = %e, "touch failed on child");
            }
        }
        Ok(())
    }
}
