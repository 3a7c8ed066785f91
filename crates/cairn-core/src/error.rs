//! Error taxonomy shared by every location and combinator.

use thiserror::Error;

/// Errors surfaced to storage callers.
///
/// Inside a combinator, absence and policy rejections drive traversal and
/// never appear here; transient errors are retried at the adapter layer
/// and aggregate when every child fails the same way; fatal errors
/// short-circuit.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Content did not verify against its key.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Hex digest the caller asked for.
        expected: String,
        /// Hex digest the payload actually hashed to.
        actual: String,
    },
    /// No location held the key.
    #[error("key not found")]
    NotFound,
    /// No writable tier or child accepted the payload.
    #[error("storage full")]
    StorageFull,
    /// The backend denied access.
    #[error("permission denied: {0}")]
    Permission(String),
    /// A retryable failure: network, timeout, contended lock.
    #[error("transient: {0}")]
    Transient(String),
    /// Metadata missing or inconsistent beyond what a sweep can repair.
    #[error("corruption: {0}")]
    Corruption(String),
    /// Invalid composition or location configuration.
    #[error("config: {0}")]
    Config(String),
    /// Underlying I/O failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// True when a bounded retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Collapse a set of transient failures into one.
    pub fn aggregate_transient(errors: Vec<Self>) -> Self {
        let parts: Vec<String> = errors.iter().map(ToString::to_string).collect();
        Self::Transient(parts.join("; "))
    }
}
