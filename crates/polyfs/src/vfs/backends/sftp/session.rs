//! Native SFTP session contract.
//!
//! Mirrors the shape of the wire protocol: path-based requests answered
//! with attributes or a status code. The protocol's status codes are
//! coarse (a missing parent and an existing destination can both come back
//! as a generic failure), so callers disambiguate with follow-up probes.

use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::SystemTime;

use thiserror::Error;

/// SFTP status codes a server can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    NoSuchFile,
    PermissionDenied,
    Failure,
    BadMessage,
    NoConnection,
    ConnectionLost,
    OpUnsupported,
}

/// A failed SFTP request.
#[derive(Debug, Clone, Error)]
#[error("{code:?}: {message}")]
pub struct SftpError {
    pub code: StatusCode,
    pub message: String,
}

impl SftpError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn no_such_file(path: &str) -> Self {
        Self::new(StatusCode::NoSuchFile, format!("No such file: {path}"))
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Failure, message)
    }

    pub fn is_no_such_file(&self) -> bool {
        self.code == StatusCode::NoSuchFile
    }
}

/// Kind of a remote entry, from its mode bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    File,
    Directory,
    /// Symlinks, devices and other special files.
    Other,
}

/// Attributes returned by `stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStat {
    pub kind: RemoteKind,
    pub size: u64,
    pub atime: Option<SystemTime>,
    pub mtime: Option<SystemTime>,
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub stat: RemoteStat,
}

/// An open SFTP session. All paths are absolute remote paths.
pub trait SftpSession: Send {
    fn stat(&mut self, path: &str) -> Result<RemoteStat, SftpError>;

    /// Directory contents with attributes, excluding `.` and `..`.
    fn listdir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, SftpError>;

    fn mkdir(&mut self, path: &str) -> Result<(), SftpError>;

    fn rmdir(&mut self, path: &str) -> Result<(), SftpError>;

    fn remove(&mut self, path: &str) -> Result<(), SftpError>;

    fn rename(&mut self, src: &str, dst: &str) -> Result<(), SftpError>;

    /// Stream a remote file's content.
    fn read_file(&mut self, path: &str) -> Result<Box<dyn Read + Send>, SftpError>;

    /// Create or truncate a remote file and write `contents` to it.
    fn write_file(&mut self, path: &str, contents: &mut dyn Read) -> Result<(), SftpError>;

    /// Close the session channel.
    fn close(&mut self);
}

/// Login credentials for a transport that is not yet authenticated.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// An SSH transport able to carry SFTP sessions.
pub trait SshTransport: Send + Sync {
    fn is_authenticated(&self) -> bool;

    fn authenticate(&self, credentials: &Credentials) -> Result<(), SftpError>;

    fn open_session(&self) -> Result<Box<dyn SftpSession>, SftpError>;

    fn close(&self);
}

/// Opens fresh transports to a host.
pub trait Connector: Send + Sync {
    fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn SshTransport>, SftpError>;
}

/// What an [`SftpFs`](super::SftpFs) builds its session from.
pub enum Connection {
    /// An already-open session channel. Borrowed: never torn down beyond
    /// closing the session itself.
    Channel(Box<dyn SftpSession>),
    /// An existing transport, authenticated on demand. Borrowed.
    Transport(Arc<dyn SshTransport>),
    /// A host to dial. The resulting transport is owned and closed with
    /// the filesystem.
    Host {
        connector: Arc<dyn Connector>,
        host: String,
        port: u16,
    },
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connection::Channel(_) => f.write_str("Connection::Channel"),
            Connection::Transport(_) => f.write_str("Connection::Transport"),
            Connection::Host { host, port, .. } => write!(f, "Connection::Host({host}:{port})"),
        }
    }
}
