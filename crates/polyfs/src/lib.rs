//! # polyfs
//!
//! A single filesystem contract over storage with very different native
//! primitives: an in-process tree, a flat eventually consistent object
//! store and a remote SFTP session. Code written against [`Filesystem`]
//! runs unchanged on any of them.

pub mod config;
pub mod vfs;

pub use config::{BackendConfig, ConfigError, FsConfig, ObjectStoreConfig, SftpConfig};
pub use vfs::{
    backends::{MemoryFs, MemoryObjectStore, MemorySftpServer, ObjectStoreFs, SftpFs},
    DirEntry, FileHandle, FileInfo, FileType, Filesystem, ListOptions, OpenMode, VfsError,
    VfsResult,
};
