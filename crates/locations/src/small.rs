//! Size-gated writes over a child location.

use std::error::Error as _;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use cairn_core::digest::{HashAlgorithm, Key};
use cairn_core::error::StoreError;
use cairn_core::source::ByteSource;

use crate::{DeleteOutcome, Location, Payload, Presence, WriteOutcome};

/// Rejects writes whose payload exceeds a byte threshold.
///
/// Reads and deletes pass through unchanged, so entries written before the
/// threshold changed stay reachable. Sources of unknown size are streamed
/// through a guard that trips once the running count crosses the
/// threshold; the child's write protocol unwinds its partial data and the
/// abort surfaces as [`WriteOutcome::RejectedPolicy`].
pub struct Small {
    child: Arc<dyn Location>,
    threshold: u64,
}

impl Small {
    /// Gate `child` behind a `threshold` in bytes.
    pub fn new(child: Arc<dyn Location>, threshold: u64) -> Self {
        Self { child, threshold }
    }

    /// The configured threshold in bytes.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}

impl Location for Small {
    fn algorithm(&self) -> HashAlgorithm {
        self.child.algorithm()
    }

    fn readable(&self) -> bool {
        self.child.readable()
    }

    fn writable(&self) -> bool {
        self.child.writable()
    }

    fn read(&self, key: &Key) -> Result<Option<Payload>, StoreError> {
        self.child.read(key)
    }

    fn write(&self, key: &Key, source: &dyn ByteSource) -> Result<WriteOutcome, StoreError> {
        if let Some(n) = source.len() {
            if n > self.threshold {
                tracing::debug!(key = %key, size = n, threshold = self.threshold, "payload over size threshold");
                return Ok(WriteOutcome::RejectedPolicy);
            }
            return self.child.write(key, source);
        }
        let guarded = GuardedSource { inner: source, limit: self.threshold };
        match self.child.write(key, &guarded) {
            Err(StoreError::Io(e)) if is_threshold_trip(&e) => {
                tracing::debug!(key = %key, threshold = self.threshold, "payload crossed size threshold mid-stream");
                Ok(WriteOutcome::RejectedPolicy)
            }
            other => other,
        }
    }

    fn contains(&self, key: &Key) -> Result<Presence, StoreError> {
        self.child.contains(key)
    }

    fn delete(&self, key: &Key) -> Result<DeleteOutcome, StoreError> {
        self.child.delete(key)
    }

    fn touch(&self, key: &Key) -> Result<(), StoreError> {
        self.child.touch(key)
    }
}

/// Marker error produced when a guarded stream crosses the threshold.
#[derive(Debug)]
struct ThresholdExceeded {
    limit: u64,
}

impl fmt::Display for ThresholdExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "payload exceeded {} byte threshold", self.limit)
    }
}

impl std::error::Error for ThresholdExceeded {}

fn is_threshold_trip(e: &io::Error) -> bool {
    e.get_ref().is_some_and(|inner| {
        inner.is::<ThresholdExceeded>()
            || inner.source().is_some_and(|s| s.is::<ThresholdExceeded>())
    })
}

struct GuardedSource<'a> {
    inner: &'a dyn ByteSource,
    limit: u64,
}

impl ByteSource for GuardedSource<'_> {
    fn len(&self) -> Option<u64> {
        None
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(GuardedReader { inner: self.inner.open()?, limit: self.limit, seen: 0 }))
    }
}

struct GuardedReader<'a> {
    inner: Box<dyn Read + Send + 'a>,
    limit: u64,
    seen: u64,
}

impl Read for GuardedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.seen += n as u64;
        if self.seen > self.limit {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                ThresholdExceeded { limit: self.limit },
            ));
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guarded_reader_trips_past_limit() {
        let src = cairn_core::source::BytesSource::new(vec![0u8; 64]);
        let guarded = GuardedSource { inner: &src, limit: 16 };
        let mut reader = guarded.open().unwrap();
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert!(is_threshold_trip(&err));
    }

    #[test]
    fn guarded_reader_allows_exactly_limit() {
        let src = cairn_core::source::BytesSource::new(vec![0u8; 16]);
        let guarded = GuardedSource { inner: &src, limit: 16 };
        let mut reader = guarded.open().unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 16);
    }
}
