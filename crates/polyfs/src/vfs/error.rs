//! VFS error types.
//!
//! One taxonomy shared by every backend. Backends translate their native
//! failures into these kinds before returning; anything that cannot be
//! classified is passed through as [`VfsError::Underlying`] with the native
//! message intact.

use std::io;
use thiserror::Error;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Resource not found.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Directory not found.
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Destination of a copy/move/rename already exists.
    #[error("destination exists: {0}")]
    DestinationExists(String),

    /// File where a directory was expected, or the other way round.
    #[error("{detail}: {path}")]
    WrongType { path: String, detail: &'static str },

    /// A writer or appender already holds the file.
    #[error("resource is locked: {0}")]
    Locked(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// Parent directory does not exist.
    #[error("parent directory missing: {0}")]
    MissingParent(String),

    /// Path escapes the sandbox root.
    #[error("path is outside root: {0}")]
    PathContainment(String),

    /// Invalid path or argument combination.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Permission denied by the backend.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Operation not supported by this backend.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// Backend-native failure that maps to nothing above.
    #[error("{0}")]
    Underlying(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a DirectoryNotFound error.
    pub fn directory_not_found(path: impl Into<String>) -> Self {
        Self::DirectoryNotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a DestinationExists error.
    pub fn destination_exists(path: impl Into<String>) -> Self {
        Self::DestinationExists(path.into())
    }

    /// A directory was found where a file was required.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::WrongType {
            path: path.into(),
            detail: "is a directory",
        }
    }

    /// A file was found where a directory was required.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::WrongType {
            path: path.into(),
            detail: "not a directory",
        }
    }

    /// Create a WrongType error with a custom detail.
    pub fn wrong_type(path: impl Into<String>, detail: &'static str) -> Self {
        Self::WrongType {
            path: path.into(),
            detail,
        }
    }

    /// Create a Locked error.
    pub fn locked(path: impl Into<String>) -> Self {
        Self::Locked(path.into())
    }

    /// Create a NotEmpty error.
    pub fn not_empty(path: impl Into<String>) -> Self {
        Self::NotEmpty(path.into())
    }

    /// Create a MissingParent error.
    pub fn missing_parent(path: impl Into<String>) -> Self {
        Self::MissingParent(path.into())
    }

    /// Create a PathContainment error.
    pub fn path_containment(path: impl Into<String>) -> Self {
        Self::PathContainment(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create an Underlying error, preserving the native message.
    pub fn underlying(msg: impl Into<String>) -> Self {
        Self::Underlying(msg.into())
    }

    /// The path this error refers to, if it carries one.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::NotFound(p)
            | Self::DirectoryNotFound(p)
            | Self::AlreadyExists(p)
            | Self::DestinationExists(p)
            | Self::Locked(p)
            | Self::NotEmpty(p)
            | Self::MissingParent(p)
            | Self::PathContainment(p)
            | Self::PermissionDenied(p) => Some(p),
            Self::WrongType { path, .. } => Some(path),
            Self::InvalidPath(_) | Self::Unsupported(_) | Self::Underlying(_) | Self::Io(_) => None,
        }
    }

    /// Returns true for `NotFound` and `DirectoryNotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::DirectoryNotFound(_))
    }

    /// Returns true for `WrongType`.
    pub fn is_wrong_type(&self) -> bool {
        matches!(self, Self::WrongType { .. })
    }

    /// Returns true for `AlreadyExists` and `DestinationExists`.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_) | Self::DestinationExists(_))
    }
}

/// Convert VfsError to std::io::Error so handles can surface it through
/// `std::io::Write::flush`.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) | VfsError::DirectoryNotFound(msg) => {
                io::Error::new(io::ErrorKind::NotFound, msg)
            }
            VfsError::AlreadyExists(msg) | VfsError::DestinationExists(msg) => {
                io::Error::new(io::ErrorKind::AlreadyExists, msg)
            }
            VfsError::WrongType { path, detail } => {
                io::Error::new(io::ErrorKind::InvalidInput, format!("{detail}: {path}"))
            }
            VfsError::Locked(msg) => io::Error::new(io::ErrorKind::WouldBlock, msg),
            VfsError::NotEmpty(msg) => io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg),
            VfsError::MissingParent(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::PathContainment(msg) | VfsError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::Unsupported(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            VfsError::Underlying(msg) => io::Error::other(msg),
            VfsError::Io(e) => e,
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
