//! SFTP root confinement and connection ownership.

mod common;

use std::sync::Arc;

use polyfs::vfs::backends::sftp::{Connection, Credentials};
use polyfs::{Filesystem, ListOptions, MemorySftpServer, OpenMode, SftpConfig, SftpFs, VfsError};

const ESCAPES: &[&str] = &[
    "../outside",
    "../../etc/passwd",
    "a/../../polyfs-other/secret",
    "./../..",
];

fn dialed(server: &MemorySftpServer) -> SftpFs {
    common::init_tracing();
    let config = SftpConfig {
        host: "files.internal".to_string(),
        root: common::SFTP_ROOT.to_string(),
        username: Some("deploy".to_string()),
        ..Default::default()
    };
    SftpFs::from_config(Arc::new(server.clone()), &config)
}

#[test]
fn test_escapes_rejected_before_any_request() {
    let server = MemorySftpServer::new();
    server.add_dir(common::SFTP_ROOT);
    server.add_file("/home/polyfs-other/secret", b"do not read");
    let fs = dialed(&server);

    for path in ESCAPES {
        let containment = |r: Result<(), VfsError>| matches!(r, Err(VfsError::PathContainment(_)));
        assert!(containment(fs.open(path, OpenMode::read()).map(|_| ())), "{path}");
        assert!(containment(fs.makedir(path, true, true)), "{path}");
        assert!(containment(fs.remove(path)), "{path}");
        assert!(containment(fs.removedir(path, false, true)), "{path}");
        assert!(containment(fs.getinfo(path).map(|_| ())), "{path}");
        assert!(containment(fs.listdir(path, &ListOptions::new()).map(|_| ())), "{path}");
        assert!(containment(fs.setcontents(path, &mut &b"x"[..])), "{path}");
        assert!(!fs.exists(path), "{path}");
        assert!(!fs.isdir(path), "{path}");
    }

    // Not even a connection was needed.
    assert!(server.transports().is_empty());
    assert_eq!(server.call_count(), 0);
    assert_eq!(server.contents("/home/polyfs-other/secret").unwrap(), b"do not read");
}

#[test]
fn test_absolute_paths_stay_under_root() {
    let server = MemorySftpServer::new();
    server.add_dir(common::SFTP_ROOT);
    let fs = dialed(&server);

    common::write(&fs, "/../../notes.txt", b"inside");
    assert_eq!(server.contents("/home/polyfs/notes.txt").unwrap(), b"inside");
    assert!(!server.has("/notes.txt"));
    assert_eq!(fs.root(), common::SFTP_ROOT);
}

#[test]
fn test_owned_transport_closed_with_filesystem() {
    let server = MemorySftpServer::new();
    server.add_dir(common::SFTP_ROOT);
    let fs = dialed(&server);

    fs.makedir("/work", false, false).unwrap();
    assert!(fs.owns_transport());
    assert_eq!(server.transports().len(), 1);
    assert_eq!(server.open_sessions(), 1);

    drop(fs);
    assert_eq!(server.open_sessions(), 0);
    assert!(server.transports()[0].is_closed());
}

#[test]
fn test_borrowed_transport_survives() {
    let server = MemorySftpServer::new();
    server.add_dir(common::SFTP_ROOT);
    let transport = server.transport();

    let first = SftpFs::new(Connection::Transport(transport.clone()), common::SFTP_ROOT)
        .with_credentials(Credentials {
            username: Some("deploy".to_string()),
            password: Some("hunter2".to_string()),
        });
    common::write(&first, "/shared", b"1");
    assert!(!first.owns_transport());
    first.close();
    assert!(!transport.is_closed());

    // The same transport carries a second filesystem, already authenticated.
    let second = SftpFs::new(Connection::Transport(transport.clone()), common::SFTP_ROOT);
    assert_eq!(second.getcontents("/shared").unwrap(), b"1");
}

#[test]
fn test_closed_filesystem_rejects_calls() {
    let server = MemorySftpServer::new();
    server.add_dir(common::SFTP_ROOT);
    let fs = dialed(&server);
    common::write(&fs, "/f", b"x");

    fs.close();
    assert!(!fs.exists("/f"));
    assert!(fs.getcontents("/f").is_err());
    assert_eq!(server.contents("/home/polyfs/f").unwrap(), b"x");
}

#[test]
fn test_credentials_debug_redacts_password() {
    let credentials = Credentials {
        username: Some("deploy".to_string()),
        password: Some("hunter2".to_string()),
    };
    let shown = format!("{credentials:?}");
    assert!(shown.contains("deploy"));
    assert!(!shown.contains("hunter2"));
}
