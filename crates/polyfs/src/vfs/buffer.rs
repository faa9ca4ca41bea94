//! Local staging buffer for write-through remote backends.
//!
//! Remote stores expose whole-object `setcontents` rather than seekable
//! files. [`RemoteFileBuffer`] bridges the two: all reads, writes and seeks
//! hit a [`SpooledTempFile`] (in memory below a threshold, spilled to an
//! anonymous temp file above it) and nothing crosses the network until
//! `flush` or `close`.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use tempfile::SpooledTempFile;

use super::error::VfsResult;
use super::ops::FileHandle;
use super::types::OpenMode;

/// Default in-memory size before the staging buffer spills to disk.
pub const DEFAULT_SPOOL_THRESHOLD: usize = 1024 * 1024;

/// Whole-content upload primitive a backend exposes to its buffers.
pub trait ContentSink: Send + Sync {
    /// Replace the content at `path` with everything readable from `contents`.
    fn upload(&self, path: &str, contents: &mut dyn Read) -> VfsResult<()>;
}

/// A seekable local file whose content is pushed to a [`ContentSink`] on
/// flush and close.
pub struct RemoteFileBuffer {
    file: Option<SpooledTempFile>,
    sink: Arc<dyn ContentSink>,
    path: String,
    mode: OpenMode,
}

impl std::fmt::Debug for RemoteFileBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFileBuffer")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("closed", &self.file.is_none())
            .finish()
    }
}

impl RemoteFileBuffer {
    /// Wrap an empty staging buffer.
    pub fn new(
        sink: Arc<dyn ContentSink>,
        path: impl Into<String>,
        mode: OpenMode,
        spool_threshold: usize,
    ) -> Self {
        Self {
            file: Some(SpooledTempFile::new(spool_threshold)),
            sink,
            path: path.into(),
            mode,
        }
    }

    /// Wrap a staging buffer seeded with existing remote content.
    ///
    /// Append handles are positioned at the end, everything else at the
    /// start.
    pub fn with_contents(
        sink: Arc<dyn ContentSink>,
        path: impl Into<String>,
        mode: OpenMode,
        spool_threshold: usize,
        contents: &mut dyn Read,
    ) -> VfsResult<Self> {
        let mut buffer = Self::new(sink, path, mode, spool_threshold);
        if let Some(file) = buffer.file.as_mut() {
            io::copy(contents, file)?;
            if mode.append {
                file.seek(SeekFrom::End(0))?;
            } else {
                file.seek(SeekFrom::Start(0))?;
            }
        }
        Ok(buffer)
    }

    /// The remote path this buffer writes back to.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns true once the staging buffer has spilled to disk.
    pub fn is_spilled(&self) -> bool {
        self.file.as_ref().is_some_and(SpooledTempFile::is_rolled)
    }

    /// Push the full buffer to the sink, restoring the cursor afterwards.
    fn write_back(&mut self) -> VfsResult<()> {
        if !self.mode.is_writable() {
            return Ok(());
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let position = file.stream_position()?;
        file.seek(SeekFrom::Start(0))?;
        let pushed = self.sink.upload(&self.path, file);
        file.seek(SeekFrom::Start(position))?;
        pushed
    }
}

impl Read for RemoteFileBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(_) if !self.mode.read => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file not open for reading",
            )),
            Some(file) => file.read(buf),
            None => Ok(0),
        }
    }
}

impl Write for RemoteFileBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let writable = self.mode.is_writable();
        let append = self.mode.append;
        match self.file.as_mut() {
            Some(_) if !writable => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file not open for writing",
            )),
            Some(file) => {
                if append {
                    file.seek(SeekFrom::End(0))?;
                }
                file.write(buf)
            }
            None => Ok(0),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_back().map_err(io::Error::from)
    }
}

impl Seek for RemoteFileBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self.file.as_mut() {
            Some(file) => file.seek(pos),
            None => Ok(0),
        }
    }
}

impl FileHandle for RemoteFileBuffer {
    fn close(&mut self) -> VfsResult<()> {
        if self.file.is_none() {
            return Ok(());
        }
        let result = self.write_back();
        self.file = None;
        result
    }

    fn is_closed(&self) -> bool {
        self.file.is_none()
    }
}

impl Drop for RemoteFileBuffer {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(e) = self.close() {
                tracing::warn!("write-back of dropped buffer for {} failed: {}", self.path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::error::VfsError;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct RecordingSink {
        uploads: Mutex<Vec<(String, Vec<u8>)>>,
        fail: bool,
    }

    impl RecordingSink {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn latest(&self) -> HashMap<String, Vec<u8>> {
            self.uploads.lock().iter().cloned().collect()
        }

        fn count(&self) -> usize {
            self.uploads.lock().len()
        }
    }

    impl ContentSink for RecordingSink {
        fn upload(&self, path: &str, contents: &mut dyn Read) -> VfsResult<()> {
            if self.fail {
                return Err(VfsError::underlying("remote unavailable"));
            }
            let mut data = Vec::new();
            contents.read_to_end(&mut data)?;
            self.uploads.lock().push((path.to_string(), data));
            Ok(())
        }
    }

    #[test]
    fn test_no_upload_before_flush() {
        let sink = Arc::new(RecordingSink::default());
        let mut buf = RemoteFileBuffer::new(sink.clone(), "/f", OpenMode::write(), 64);
        buf.write_all(b"hello").unwrap();
        assert_eq!(sink.count(), 0);

        buf.close().unwrap();
        assert_eq!(sink.latest()["/f"], b"hello");
    }

    #[test]
    fn test_flush_restores_position() {
        let sink = Arc::new(RecordingSink::default());
        let mut buf = RemoteFileBuffer::new(sink.clone(), "/f", OpenMode::write(), 64);
        buf.write_all(b"abc").unwrap();
        buf.flush().unwrap();
        assert_eq!(sink.latest()["/f"], b"abc");

        buf.write_all(b"def").unwrap();
        buf.close().unwrap();
        assert_eq!(sink.latest()["/f"], b"abcdef");
        assert_eq!(sink.count(), 2);
    }

    #[test]
    fn test_read_only_never_uploads() {
        let sink = Arc::new(RecordingSink::default());
        let mut buf = RemoteFileBuffer::with_contents(
            sink.clone(),
            "/f",
            OpenMode::read(),
            64,
            &mut &b"remote"[..],
        )
        .unwrap();
        let mut text = String::new();
        buf.read_to_string(&mut text).unwrap();
        assert_eq!(text, "remote");
        assert!(buf.write(b"x").is_err());

        buf.close().unwrap();
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_append_seeds_and_positions_at_end() {
        let sink = Arc::new(RecordingSink::default());
        let mut buf = RemoteFileBuffer::with_contents(
            sink.clone(),
            "/log",
            OpenMode::append(),
            64,
            &mut &b"one\n"[..],
        )
        .unwrap();
        buf.seek(SeekFrom::Start(0)).unwrap();
        buf.write_all(b"two\n").unwrap();
        buf.close().unwrap();
        assert_eq!(sink.latest()["/log"], b"one\ntwo\n");
    }

    #[test]
    fn test_close_idempotent() {
        let sink = Arc::new(RecordingSink::default());
        let mut buf = RemoteFileBuffer::new(sink.clone(), "/f", OpenMode::write(), 64);
        buf.write_all(b"once").unwrap();
        buf.close().unwrap();
        buf.close().unwrap();
        assert_eq!(sink.count(), 1);
        assert!(buf.is_closed());
        assert_eq!(buf.write(b"late").unwrap(), 0);
        assert_eq!(buf.read(&mut [0u8; 4]).unwrap(), 0);
    }

    #[test]
    fn test_drop_writes_back() {
        let sink = Arc::new(RecordingSink::default());
        {
            let mut buf = RemoteFileBuffer::new(sink.clone(), "/dropped", OpenMode::write(), 64);
            buf.write_all(b"safety net").unwrap();
        }
        assert_eq!(sink.latest()["/dropped"], b"safety net");
    }

    #[test]
    fn test_spills_above_threshold() {
        let sink = Arc::new(RecordingSink::default());
        let mut buf = RemoteFileBuffer::new(sink.clone(), "/big", OpenMode::write(), 8);
        assert!(!buf.is_spilled());
        buf.write_all(&[7u8; 32]).unwrap();
        assert!(buf.is_spilled());
        buf.close().unwrap();
        assert_eq!(sink.latest()["/big"].len(), 32);
    }

    #[test]
    fn test_failed_close_still_releases() {
        let sink = Arc::new(RecordingSink::failing());
        let mut buf = RemoteFileBuffer::new(sink, "/f", OpenMode::write(), 64);
        buf.write_all(b"lost").unwrap();
        assert!(matches!(buf.close(), Err(VfsError::Underlying(_))));
        assert!(buf.is_closed());
        buf.close().unwrap();
    }
}
