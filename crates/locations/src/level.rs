//! Per-tier read/write gates for a cache hierarchy.

use std::sync::Arc;

use crate::Location;

/// One tier in a [`crate::Levels`] hierarchy with read/write gates.
///
/// The gates compose with the inner location's own capability flags: a
/// tier participates in reads only when both the gate and the location
/// allow it, likewise for writes.
#[derive(Clone)]
pub struct Level {
    inner: Arc<dyn Location>,
    read: bool,
    write: bool,
}

impl Level {
    /// Wrap a location with explicit gates.
    pub fn new(inner: Arc<dyn Location>, read: bool, write: bool) -> Self {
        Self { inner, read, write }
    }

    /// A tier with both gates open.
    pub fn open(inner: Arc<dyn Location>) -> Self {
        Self::new(inner, true, true)
    }

    /// The wrapped location.
    pub fn location(&self) -> &Arc<dyn Location> {
        &self.inner
    }

    /// Whether reads may traverse this tier.
    pub fn can_read(&self) -> bool {
        self.read && self.inner.readable()
    }

    /// Whether writes and promotions may land in this tier.
    pub fn can_write(&self) -> bool {
        self.write && self.inner.writable()
    }
}

impl From<Arc<dyn Location>> for Level {
    fn from(inner: Arc<dyn Location>) -> Self {
        Self::open(inner)
    }
}
