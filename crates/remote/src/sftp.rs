//! SFTP/SCP adapter mirroring the local directory layout.

use std::sync::Arc;
use std::time::Duration;

use cairn_core::digest::{HashAlgorithm, Key};
use cairn_core::error::StoreError;
use cairn_core::retry::RetryPolicy;
use cairn_core::source::ByteSource;
use locations::{DeleteOutcome, Location, Payload, Presence, WriteOutcome};

use crate::{object_name, RemoteBody, RemoteError};

/// Operations an SFTP/SCP session must provide.
///
/// Sessions that cannot rename (plain SCP) report it through
/// [`SftpClient::supports_rename`]; the adapter then uploads directly to
/// the final path instead of publishing with temp-then-rename.
pub trait SftpClient: Send + Sync {
    /// Open a remote file for reading; `Ok(None)` when it does not exist.
    fn open_read(
        &self,
        path: &str,
        deadline: Option<Duration>,
    ) -> Result<Option<RemoteBody>, RemoteError>;

    /// Upload a stream to a remote path, creating it.
    fn upload(
        &self,
        path: &str,
        reader: &mut dyn std::io::Read,
        deadline: Option<Duration>,
    ) -> Result<(), RemoteError>;

    /// Atomically rename a remote file.
    fn rename(&self, from: &str, to: &str, deadline: Option<Duration>)
        -> Result<(), RemoteError>;

    /// Whether [`SftpClient::rename`] is available on this session.
    fn supports_rename(&self) -> bool {
        true
    }

    /// Whether a remote path exists.
    fn exists(&self, path: &str, deadline: Option<Duration>) -> Result<bool, RemoteError>;

    /// Remove a remote file; returns whether it existed.
    fn remove(&self, path: &str, deadline: Option<Duration>) -> Result<bool, RemoteError>;

    /// Create a remote directory and any missing parents.
    fn mkdirs(&self, path: &str, deadline: Option<Duration>) -> Result<(), RemoteError>;
}

/// A remote directory over SFTP/SCP, exposed as a location.
pub struct SftpLocation {
    client: Arc<dyn SftpClient>,
    algorithm: HashAlgorithm,
    root: String,
    retry: RetryPolicy,
    deadline: Option<Duration>,
}

impl SftpLocation {
    /// Wrap `client`, storing entries under `root` with the local
    /// `<shard>/<rest>` layout.
    pub fn new(
        client: Arc<dyn SftpClient>,
        algorithm: HashAlgorithm,
        root: impl Into<String>,
    ) -> Self {
        Self {
            client,
            algorithm,
            root: root.into(),
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

    fn entry_path(&self, key: &Key) -> String {
        format!("{}/{}", self.root, object_name(key))
    }

    fn shard_path(&self, key: &Key) -> String {
        format!("{}/{}", self.root, key.shard())
    }

    fn temp_path(&self, key: &Key) -> String {
        format!("{}/.tmp/{}", self.root, key.to_hex())
    }
}

impl Location for SftpLocation {
    fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn read(&self, key: &Key) -> Result<Option<Payload>, StoreError> {
        let path = self.entry_path(key);
        let body = self.retry.run(|| {
            match self.client.open_read(&path, self.deadline) {
                Ok(body) => Ok(body),
                Err(RemoteError::NotFound) => Ok(None),
                Err(e) => Err(e.into_store()),
            }
        })?;
        Ok(body.map(|b| Payload::new(b.reader, b.len)))
    }

    fn write(&self, key: &Key, source: &dyn ByteSource) -> Result<WriteOutcome, StoreError> {
        let path = self.entry_path(key);
        let result = self.retry.run(|| {
            if self.client.exists(&path, self.deadline).map_err(RemoteError::into_store)? {
                return Ok(());
            }
            self.client
                .mkdirs(&self.shard_path(key), self.deadline)
                .map_err(RemoteError::into_store)?;
            let mut reader = source.open()?;
            if self.client.supports_rename() {
                let tmp = self.temp_path(key);
                self.client
                    .mkdirs(&format!("{}/.tmp", self.root), self.deadline)
                    .map_err(RemoteError::into_store)?;
                self.client
                    .upload(&tmp, &mut reader, self.deadline)
                    .map_err(RemoteError::into_store)?;
                self.client.rename(&tmp, &path, self.deadline).map_err(RemoteError::into_store)
            } else {
                self.client.upload(&path, &mut reader, self.deadline).map_err(RemoteError::into_store)
            }
        });
        match result {
            Ok(()) => Ok(WriteOutcome::Accepted),
            Err(StoreError::StorageFull) => Ok(WriteOutcome::RejectedFull),
            Err(e) => Err(e),
        }
    }

    fn contains(&self, key: &Key) -> Result<Presence, StoreError> {
        match self.client.exists(&self.entry_path(key), self.deadline) {
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
        let path = self.entry_path(key);
        let existed = self.retry.run(|| {
            match self.client.remove(&path, self.deadline) {
                Ok(existed) => Ok(existed),
                Err(RemoteError::NotFound) => Ok(false),
                Err(e) => Err(e.into_store()),
            }
        })?;
        Ok(if existed { DeleteOutcome::Removed } else { DeleteOutcome::Absent })
    }
}
