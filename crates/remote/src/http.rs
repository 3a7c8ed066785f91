//! Read-only adapter for an HTTP autoindex mirror.

use std::sync::Arc;
use std::time::Duration;

use cairn_core::digest::{HashAlgorithm, Key};
use cairn_core::error::StoreError;
use cairn_core::retry::RetryPolicy;
use cairn_core::source::ByteSource;
use locations::{DeleteOutcome, Location, Payload, Presence, WriteOutcome};

use crate::{object_name, RemoteBody, RemoteError};

/// Minimal HTTP operations for an autoindex mirror.
pub trait HttpFetch: Send + Sync {
    /// GET the URL; `Ok(None)` on 404.
    fn get(
        &self,
        url: &str,
        deadline: Option<Duration>,
    ) -> Result<Option<RemoteBody>, RemoteError>;

    /// HEAD the URL; `Ok(None)` on 404. Servers that refuse HEAD may
    /// return any error; the adapter degrades to `Unknown`.
    fn head(&self, url: &str, deadline: Option<Duration>) -> Result<Option<u64>, RemoteError>;
}

/// An HTTP autoindex serving the deterministic `<shard>/<rest>` layout.
///
/// Always read-only: writes and deletes report `RejectedReadonly`.
pub struct HttpIndexLocation {
    client: Arc<dyn HttpFetch>,
    algorithm: HashAlgorithm,
    base_url: String,
    retry: RetryPolicy,
    deadline: Option<Duration>,
}

impl HttpIndexLocation {
    /// Serve entries from `base_url`.
    pub fn new(
        client: Arc<dyn HttpFetch>,
        algorithm: HashAlgorithm,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, algorithm, base_url, retry: RetryPolicy::default(), deadline: None }
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Bound every request by a deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn url_for(&self, key: &Key) -> String {
        format!("{}/{}", self.base_url, object_name(key))
    }
}

impl Location for HttpIndexLocation {
    fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn writable(&self) -> bool {
        false
    }

    fn read(&self, key: &Key) -> Result<Option<Payload>, StoreError> {
        let url = self.url_for(key);
        let body = self.retry.run(|| {
            match self.client.get(&url, self.deadline) {
                Ok(body) => Ok(body),
                Err(RemoteError::NotFound) => Ok(None),
                Err(e) => Err(e.into_store()),
            }
        })?;
        Ok(body.map(|b| Payload::new(b.reader, b.len)))
    }

    fn write(&self, _key: &Key, _source: &dyn ByteSource) -> Result<WriteOutcome, StoreError> {
        Ok(WriteOutcome::RejectedReadonly)
    }

    fn contains(&self, key: &Key) -> Result<Presence, StoreError> {
        match self.client.head(&self.url_for(key), self.deadline) {
            Ok(Some(_)) => Ok(Presence::Present),
            Ok(None) | Err(RemoteError::NotFound) => Ok(Presence::Absent),
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "HEAD unavailable, presence unknown");
                Ok(Presence::Unknown)
            }
        }
    }

    fn delete(&self, _key: &Key) -> Result<DeleteOutcome, StoreError> {
        Ok(DeleteOutcome::RejectedReadonly)
    }
}
