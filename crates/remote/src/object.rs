//! Object-store adapter (S3 or compatible).

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use cairn_core::digest::{HashAlgorithm, Key};
use cairn_core::error::StoreError;
use cairn_core::retry::RetryPolicy;
use cairn_core::source::ByteSource;
use locations::{DeleteOutcome, Location, Payload, Presence, WriteOutcome};

use crate::{object_name, RemoteBody, RemoteError};

/// Operations an object-store client must provide.
///
/// Implementations wrap an external SDK. `put` receives the payload size
/// when it is known so the client can choose a single-part upload; with
/// an unknown size the client is expected to spool or upload multipart.
pub trait ObjectClient: Send + Sync {
    /// Fetch an object; `Ok(None)` when it does not exist.
    fn get(
        &self,
        name: &str,
        deadline: Option<Duration>,
    ) -> Result<Option<RemoteBody>, RemoteError>;

    /// Store an object, streaming from `reader`.
    fn put(
        &self,
        name: &str,
        reader: &mut dyn Read,
        len: Option<u64>,
        deadline: Option<Duration>,
    ) -> Result<(), RemoteError>;

    /// Object size when present (HEAD).
    fn head(&self, name: &str, deadline: Option<Duration>) -> Result<Option<u64>, RemoteError>;

    /// Remove an object; returns whether it existed.
    fn delete(&self, name: &str, deadline: Option<Duration>) -> Result<bool, RemoteError>;
}

/// A fixed bucket in an object store, exposed as a location.
pub struct ObjectLocation {
    client: Arc<dyn ObjectClient>,
    algorithm: HashAlgorithm,
    retry: RetryPolicy,
    deadline: Option<Duration>,
}

impl ObjectLocation {
    /// Wrap `client` with the default retry policy and no deadline.
    pub fn new(client: Arc<dyn ObjectClient>, algorithm: HashAlgorithm) -> Self {
        Self { client, algorithm, retry: RetryPolicy::default(), deadline: None }
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Bound every backend operation by a deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

impl Location for ObjectLocation {
    fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn read(&self, key: &Key) -> Result<Option<Payload>, StoreError> {
        let name = object_name(key);
        let body = self.retry.run(|| {
            match self.client.get(&name, self.deadline) {
                Ok(body) => Ok(body),
                Err(RemoteError::NotFound) => Ok(None),
                Err(e) => Err(e.into_store()),
            }
        })?;
        Ok(body.map(|b| Payload::new(b.reader, b.len)))
    }

    fn write(&self, key: &Key, source: &dyn ByteSource) -> Result<WriteOutcome, StoreError> {
        let name = object_name(key);
        let result = self.retry.run(|| {
            let mut reader = source.open()?;
            self.client
                .put(&name, &mut reader, source.len(), self.deadline)
                .map_err(RemoteError::into_store)
        });
        match result {
            Ok(()) => Ok(WriteOutcome::Accepted),
            Err(StoreError::StorageFull) => Ok(WriteOutcome::RejectedFull),
            Err(e) => Err(e),
        }
    }

    fn contains(&self, key: &Key) -> Result<Presence, StoreError> {
        let name = object_name(key);
        match self.client.head(&name, self.deadline) {
            Ok(Some(_)) => Ok(Presence::Present),
            Ok(None) | Err(RemoteError::NotFound) => Ok(Presence::Absent),
            Err(e) => {
                let e = e.into_store();
                if e.is_transient() {
                    tracing::debug!(key = %key, error = %e, "probe failed transiently");
                    Ok(Presence::Unknown)
                } else {
                    Err(e)
                }
            }
        }
    }

    fn delete(&self, key: &Key) -> Result<DeleteOutcome, StoreError> {
        let name = object_name(key);
        let existed = self.retry.run(|| {
            match self.client.delete(&name, self.deadline) {
                Ok(existed) => Ok(existed),
                Err(RemoteError::NotFound) => Ok(false),
                Err(e) => Err(e.into_store()),
            }
        })?;
        Ok(if existed { DeleteOutcome::Removed } else { DeleteOutcome::Absent })
    }
}
