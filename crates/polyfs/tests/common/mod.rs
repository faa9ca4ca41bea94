//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use polyfs::vfs::backends::sftp::Connection;
use polyfs::{Filesystem, MemoryFs, MemoryObjectStore, MemorySftpServer, ObjectStoreFs, SftpFs};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Remote directory the SFTP fixture is confined to.
pub const SFTP_ROOT: &str = "/home/polyfs";

pub fn memory_fs() -> MemoryFs {
    MemoryFs::new()
}

pub fn object_store_fs() -> (Arc<MemoryObjectStore>, ObjectStoreFs) {
    let client = Arc::new(MemoryObjectStore::new());
    let fs = ObjectStoreFs::new(client.clone(), "contract")
        .with_prefix("suite")
        .with_poll_interval(Duration::ZERO);
    (client, fs)
}

pub fn sftp_fs() -> (MemorySftpServer, SftpFs) {
    let server = MemorySftpServer::new();
    server.add_dir(SFTP_ROOT);
    let fs = SftpFs::new(Connection::Channel(server.session()), SFTP_ROOT);
    (server, fs)
}

/// One fresh instance of every backend.
pub fn backends() -> Vec<(&'static str, Box<dyn Filesystem>)> {
    init_tracing();
    let memory: Box<dyn Filesystem> = Box::new(memory_fs());
    let object_store: Box<dyn Filesystem> = Box::new(object_store_fs().1);
    let sftp: Box<dyn Filesystem> = Box::new(sftp_fs().1);
    vec![
        ("memory", memory),
        ("object_store", object_store),
        ("sftp", sftp),
    ]
}

/// Write `data` to `path` through a handle.
pub fn write(fs: &dyn Filesystem, path: &str, data: &[u8]) {
    fs.setcontents(path, &mut &data[..])
        .unwrap_or_else(|e| panic!("setcontents {path}: {e}"));
}
