//! Virtual filesystem abstraction.
//!
//! One path-based contract, many storage substrates. Key components:
//!
//! - [`Filesystem`] - Core trait every backend implements
//! - [`FileHandle`] - Open file: `Read + Write + Seek`, closed on drop
//! - [`MemoryFs`] - In-process tree with write locks and handle orphaning
//! - [`ObjectStoreFs`] - Flat key/value store with emulated directories
//! - [`SftpFs`] - Remote SFTP session confined to a root directory
//! - [`RemoteFileBuffer`] - Local staging buffer for write-through backends
//!
//! ## Design Decisions
//!
//! - **Synchronous**: every call blocks the calling thread. Backends add no
//!   concurrency of their own.
//! - **String paths**: virtual paths are `/`-separated and normalized by
//!   `polyfs-path` before any backend sees them.
//! - **One error taxonomy**: native failures are translated into
//!   [`VfsError`] kinds; unexplained ones pass through as
//!   [`VfsError::Underlying`].

pub mod backends;
pub mod buffer;
mod error;
mod ops;
mod types;

pub use backends::{MemoryFs, ObjectStoreFs, SftpFs};
pub use buffer::{ContentSink, RemoteFileBuffer};
pub use error::{VfsError, VfsResult};
pub use ops::{filter_listing, FileHandle, Filesystem};
pub use types::{DirEntry, FileInfo, FileType, ListOptions, OpenMode};
