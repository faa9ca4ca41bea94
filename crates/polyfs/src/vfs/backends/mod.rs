//! VFS backends.
//!
//! Backends implement [`Filesystem`](crate::vfs::Filesystem) over different
//! storage substrates.

mod memory;
pub mod object_store;
pub mod sftp;

pub use memory::MemoryFs;
pub use object_store::{MemoryObjectStore, ObjectStoreClient, ObjectStoreFs};
pub use sftp::{MemorySftpServer, SftpFs};
