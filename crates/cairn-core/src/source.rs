//! Replayable byte sources for streaming writes.
//!
//! Combinators open a source more than once: a fanout advances across
//! children after a rejection, and a level hierarchy fans a payload out to
//! every writable tier. A one-shot reader therefore has to be spooled to
//! disk first (see [`SpooledSource`]).

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// A byte source a location can open more than once.
pub trait ByteSource: Send + Sync {
    /// Payload size, when known up front. Streams of unknown size report
    /// `None` and the consumer learns the size at EOF.
    fn len(&self) -> Option<u64>;

    /// Whether the payload is empty, when the size is known.
    fn is_empty(&self) -> Option<bool> {
        self.len().map(|n| n == 0)
    }

    /// Open a fresh reader over the full payload.
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>>;
}

/// In-memory payload.
pub struct BytesSource {
    bytes: Vec<u8>,
}

impl BytesSource {
    /// Wrap the given bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into() }
    }
}

impl ByteSource for BytesSource {
    fn len(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(io::Cursor::new(self.bytes.as_slice())))
    }
}

/// Payload backed by a file on disk.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Reference the file at `path`; it must outlive the source.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The underlying file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> Option<u64> {
        fs::metadata(&self.path).ok().map(|m| m.len())
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(fs::File::open(&self.path)?))
    }
}

/// A one-shot reader drained to a temp file so it can be replayed.
///
/// The spool file is removed when the source is dropped.
pub struct SpooledSource {
    path: PathBuf,
    len: u64,
}

impl SpooledSource {
    /// Drain `reader` into a fresh spool file under `dir`.
    pub fn drain(dir: &Path, reader: &mut dyn Read) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("spool-{}", Uuid::new_v4()));
        let mut file =
            fs::OpenOptions::new().write(true).create_new(true).open(&path)?;
        match io::copy(reader, &mut file) {
            Ok(len) => Ok(Self { path, len }),
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&path);
                Err(e)
            }
        }
    }

    /// Location of the spool file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for SpooledSource {
    fn len(&self) -> Option<u64> {
        Some(self.len)
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(fs::File::open(&self.path)?))
    }
}

impl Drop for SpooledSource {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(source: &dyn ByteSource) -> Vec<u8> {
        let mut out = Vec::new();
        source.open().unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn bytes_source_replays() {
        let src = BytesSource::new(b"payload".to_vec());
        assert_eq!(src.len(), Some(7));
        assert_eq!(read_all(&src), b"payload");
        assert_eq!(read_all(&src), b"payload");
    }

    #[test]
    fn file_source_reports_len() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        fs::write(&path, b"0123456789").unwrap();
        let src = FileSource::new(&path);
        assert_eq!(src.len(), Some(10));
        assert_eq!(read_all(&src), b"0123456789");
    }

    #[test]
    fn spool_replays_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = io::Cursor::new(b"one-shot stream".to_vec());
        let spool = SpooledSource::drain(dir.path(), &mut reader).unwrap();
        assert_eq!(spool.len(), Some(15));
        assert_eq!(read_all(&spool), b"one-shot stream");
        assert_eq!(read_all(&spool), b"one-shot stream");
        let path = spool.path().to_path_buf();
        assert!(path.exists());
        drop(spool);
        assert!(!path.exists());
    }

    #[test]
    fn empty_spool_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = io::empty();
        let spool = SpooledSource::drain(dir.path(), &mut reader).unwrap();
        assert_eq!(spool.is_empty(), Some(true));
        assert_eq!(read_all(&spool), b"");
    }
}
