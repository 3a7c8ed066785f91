//! Key–value adapter (Redis or compatible), intended for small payloads.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use cairn_core::digest::{HashAlgorithm, Key};
use cairn_core::error::StoreError;
use cairn_core::retry::RetryPolicy;
use cairn_core::source::ByteSource;
use locations::{DeleteOutcome, Location, Payload, Presence, WriteOutcome};

use crate::RemoteError;

/// Operations a key–value client must provide.
pub trait KvClient: Send + Sync {
    /// Fetch a value; `Ok(None)` when the key does not exist.
    fn get(&self, key: &str, deadline: Option<Duration>)
        -> Result<Option<Vec<u8>>, RemoteError>;

    /// Store a value; [`RemoteError::Full`] when the backend is out of
    /// memory.
    fn set(&self, key: &str, value: &[u8], deadline: Option<Duration>)
        -> Result<(), RemoteError>;

    /// Cheap existence probe.
    fn exists(&self, key: &str, deadline: Option<Duration>) -> Result<bool, RemoteError>;

    /// Remove a key; returns whether it existed.
    fn delete(&self, key: &str, deadline: Option<Duration>) -> Result<bool, RemoteError>;
}

/// A namespaced slice of a KV store, exposed as a location.
///
/// Values are buffered in memory on both paths; pair this adapter with
/// [`locations::Small`] to keep payloads bounded.
pub struct KvLocation {
    client: Arc<dyn KvClient>,
    algorithm: HashAlgorithm,
    prefix: String,
    retry: RetryPolicy,
    deadline: Option<Duration>,
}

impl KvLocation {
    /// Wrap `client`, namespacing every key as `<prefix>:<hex-digest>`.
    pub fn new(
        client: Arc<dyn KvClient>,
        algorithm: HashAlgorithm,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            client,
            algorithm,
            prefix: prefix.into(),
            retry: RetryPolicy::default(),
            deadline: None,
        }
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

    fn kv_key(&self, key: &Key) -> String {
        format!("{}:{}", self.prefix, key.to_hex())
    }
}

impl Location for KvLocation {
    fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn read(&self, key: &Key) -> Result<Option<Payload>, StoreError> {
        let name = self.kv_key(key);
        let value = self.retry.run(|| {
            match self.client.get(&name, self.deadline) {
                Ok(v) => Ok(v),
                Err(RemoteError::NotFound) => Ok(None),
                Err(e) => Err(e.into_store()),
            }
        })?;
        Ok(value.map(|bytes| {
            let len = bytes.len() as u64;
            Payload::new(std::io::Cursor::new(bytes), Some(len))
        }))
    }

    fn write(&self, key: &Key, source: &dyn ByteSource) -> Result<WriteOutcome, StoreError> {
        let name = self.kv_key(key);
        let mut value = Vec::new();
        source.open()?.read_to_end(&mut value)?;
        let result = self.retry.run(|| {
            self.client.set(&name, &value, self.deadline).map_err(RemoteError::into_store)
        });
        match result {
            Ok(()) => Ok(WriteOutcome::Accepted),
            Err(StoreError::StorageFull) => Ok(WriteOutcome::RejectedFull),
            Err(e) => Err(e),
        }
    }

    fn contains(&self, key: &Key) -> Result<Presence, StoreError> {
        match self.client.exists(&self.kv_key(key), self.deadline) {
            Ok(true) => Ok(Presence::Present),
            Ok(false) | Err(RemoteError::NotFound) => Ok(Presence::Absent),
            Err(e) => {
                let e = e.into_store();
                if e.is_transient() {
                    Ok(Presence::Unknown)
                } else {
                    Err(e)
                }
            }
        }
    }

    fn delete(&self, key: &Key) -> Result<DeleteOutcome, StoreError> {
        let name = self.kv_key(key);
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
