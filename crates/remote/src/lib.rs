//! Remote backend adapters.
//!
//! Each adapter maps the location contract onto a backend through a small
//! client trait implemented by an external SDK: an object store
//! ([`object::ObjectClient`]), a key–value store ([`kv::KvClient`]), an
//! SFTP/SCP session ([`sftp::SftpClient`]), or a plain HTTP autoindex
//! mirror ([`http::HttpFetch`]). Remote layouts mirror the local
//! `<shard>/<rest>` path scheme so migration between backends is
//! bit-identical.
//!
//! Error discipline: network failures, timeouts, and server errors are
//! transient (retried with bounded backoff, then surfaced for combinators
//! to step past); authentication failures and unambiguous client errors
//! are fatal; "not found" is absence, not an error.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod http;
pub mod kv;
pub mod object;
pub mod sftp;

use std::io::Read;
use std::time::Duration;

use thiserror::Error;

use cairn_core::digest::Key;
use cairn_core::error::StoreError;

/// Failures reported by backend clients.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The object does not exist.
    #[error("object not found")]
    NotFound,
    /// Authentication or authorization failed.
    #[error("access denied: {0}")]
    Denied(String),
    /// The backend is out of memory or quota.
    #[error("backend out of space")]
    Full,
    /// The per-operation deadline expired.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    /// Connection-level failure.
    #[error("network: {0}")]
    Network(String),
    /// The backend reported a server-side error (5xx class).
    #[error("server error: {0}")]
    Server(String),
    /// The backend rejected the request itself (unambiguous 4xx class).
    #[error("request rejected: {0}")]
    Request(String),
}

impl RemoteError {
    /// Translate into the shared taxonomy.
    pub fn into_store(self) -> StoreError {
        match self {
            Self::NotFound => StoreError::NotFound,
            Self::Denied(m) => StoreError::Permission(m),
            Self::Full => StoreError::StorageFull,
            Self::Timeout(d) => StoreError::Transient(format!("timed out after {d:?}")),
            Self::Network(m) => StoreError::Transient(format!("network: {m}")),
            Self::Server(m) => StoreError::Transient(format!("server error: {m}")),
            Self::Request(m) => StoreError::Io(std::io::Error::other(m)),
        }
    }
}

/// A payload stream handed back by a backend client.
pub struct RemoteBody {
    /// The payload bytes.
    pub reader: Box<dyn Read + Send>,
    /// Payload size, when the backend reports one.
    pub len: Option<u64>,
}

impl RemoteBody {
    /// Wrap a reader, with the payload size when known.
    pub fn new(reader: impl Read + Send + 'static, len: Option<u64>) -> Self {
        Self { reader: Box::new(reader), len }
    }
}

/// Remote object name for a key: the local `<shard>/<rest>` scheme.
pub(crate) fn object_name(key: &Key) -> String {
    format!("{}/{}", key.shard(), key.rest())
}
