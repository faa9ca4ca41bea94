//! Sandboxed SFTP backend.
//!
//! Every virtual path is joined onto a fixed remote root and must stay
//! under it; anything that normalizes outside fails with
//! [`VfsError::PathContainment`] before a request is sent. SFTP status
//! codes are coarse, so failed requests are followed by `stat` probes
//! whose outcomes pick the error kind (see [`probe`]).
//!
//! The session is opened lazily on first use. When the filesystem dialed
//! the host itself it owns the transport and closes it on [`SftpFs::close`]
//! or drop; a caller-supplied transport or channel is left open.

pub mod probe;
mod reference;
mod session;

pub use reference::{MemorySftpServer, MemoryTransport};
pub use session::{
    Connection, Connector, Credentials, RemoteEntry, RemoteKind, RemoteStat, SftpError,
    SftpSession, SshTransport, StatusCode,
};

use std::io::{self, Read};
use std::sync::Arc;

use parking_lot::Mutex;
use polyfs_path as vpath;

use self::probe::{DirOutcome, MakedirOutcome, MoveOutcome, Probe, RemoveOutcome};
use crate::config::SftpConfig;
use crate::vfs::buffer::{ContentSink, RemoteFileBuffer, DEFAULT_SPOOL_THRESHOLD};
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::{FileHandle, Filesystem};
use crate::vfs::types::{DirEntry, FileInfo, FileType, OpenMode};

/// Session slot, established on first use.
struct Link {
    pending: Option<Connection>,
    credentials: Credentials,
    session: Option<Box<dyn SftpSession>>,
    transport: Option<Arc<dyn SshTransport>>,
    owns_transport: bool,
    closed: bool,
}

impl Link {
    fn session(&mut self) -> Result<&mut Box<dyn SftpSession>, SftpError> {
        if self.session.is_none() {
            self.establish()?;
        }
        self.session
            .as_mut()
            .ok_or_else(|| SftpError::new(StatusCode::NoConnection, "no session"))
    }

    fn establish(&mut self) -> Result<(), SftpError> {
        if self.closed {
            return Err(SftpError::new(StatusCode::NoConnection, "connection closed"));
        }
        let (transport, owned) = match self.pending.take() {
            None => return Err(SftpError::new(StatusCode::NoConnection, "no connection")),
            Some(Connection::Channel(session)) => {
                self.session = Some(session);
                return Ok(());
            }
            Some(Connection::Transport(transport)) => {
                self.pending = Some(Connection::Transport(Arc::clone(&transport)));
                (transport, false)
            }
            Some(Connection::Host {
                connector,
                host,
                port,
            }) => {
                let dialed = connector.connect(&host, port);
                self.pending = Some(Connection::Host {
                    connector,
                    host,
                    port,
                });
                (dialed?, true)
            }
        };

        if !transport.is_authenticated() {
            transport.authenticate(&self.credentials)?;
        }
        let session = transport.open_session()?;
        tracing::debug!("sftp session established (owns transport: {})", owned);
        self.session = Some(session);
        self.transport = Some(transport);
        self.owns_transport = owned;
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        if let Some(transport) = self.transport.take() {
            if self.owns_transport {
                transport.close();
            }
        }
        self.pending = None;
        self.closed = true;
    }
}

/// Rooted, lock-protected access to one remote session. Shared with open
/// buffers as their upload sink.
struct Remote {
    root: String,
    link: Mutex<Link>,
}

impl Remote {
    /// Resolve a virtual path under the root, failing closed on escape.
    fn resolve(&self, path: &str) -> VfsResult<String> {
        let npath = vpath::join(&self.root, vpath::relpath(&vpath::normpath(path)));
        if !vpath::is_prefix(&self.root, &npath) {
            return Err(VfsError::path_containment(path));
        }
        Ok(npath)
    }

    fn call<T>(
        &self,
        request: impl FnOnce(&mut dyn SftpSession) -> Result<T, SftpError>,
    ) -> Result<T, SftpError> {
        let mut link = self.link.lock();
        let session = link.session()?;
        request(session.as_mut())
    }

    fn probe(&self, npath: &str) -> VfsResult<Probe> {
        match self.call(|s| s.stat(npath)) {
            Ok(stat) if stat.kind == RemoteKind::Directory => Ok(Probe::Directory),
            Ok(_) => Ok(Probe::File),
            Err(e) if e.is_no_such_file() => Ok(Probe::Missing),
            Err(e) => Err(translate(npath, e)),
        }
    }

    fn write_back(&self, path: &str, contents: &mut dyn Read) -> VfsResult<()> {
        let npath = self.resolve(path)?;
        match self.call(|s| s.write_file(&npath, contents)) {
            Ok(()) => Ok(()),
            Err(e) => {
                if self.probe(&npath)? == Probe::Directory {
                    return Err(VfsError::is_a_directory(path));
                }
                if self.probe(vpath::dirname(&npath))? != Probe::Directory {
                    return Err(VfsError::missing_parent(path));
                }
                Err(translate(path, e))
            }
        }
    }
}

impl ContentSink for Remote {
    fn upload(&self, path: &str, contents: &mut dyn Read) -> VfsResult<()> {
        self.write_back(path, contents)
    }
}

impl Drop for Remote {
    fn drop(&mut self) {
        self.link.lock().shutdown();
    }
}

/// Map a native failure that no probe explained.
fn translate(path: &str, e: SftpError) -> VfsError {
    match e.code {
        StatusCode::NoSuchFile => VfsError::not_found(path),
        StatusCode::PermissionDenied => VfsError::PermissionDenied(path.to_string()),
        StatusCode::OpUnsupported => VfsError::unsupported(e.message),
        _ => VfsError::underlying(e.to_string()),
    }
}

fn canonical(path: &str) -> String {
    vpath::normpath(&vpath::abspath(path))
}

/// A filesystem on a remote SFTP server, confined to one directory.
pub struct SftpFs {
    remote: Arc<Remote>,
    spool_threshold: usize,
}

impl std::fmt::Debug for SftpFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<SftpFs: {}>", self.remote.root)
    }
}

impl SftpFs {
    /// Create a filesystem over `connection`, confined to `root`.
    ///
    /// No request is sent until the first operation.
    pub fn new(connection: Connection, root: &str) -> Self {
        Self {
            remote: Arc::new(Remote {
                root: canonical(root),
                link: Mutex::new(Link {
                    pending: Some(connection),
                    credentials: Credentials::default(),
                    session: None,
                    transport: None,
                    owns_transport: false,
                    closed: false,
                }),
            }),
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
        }
    }

    /// Dial the configured host through `connector`.
    pub fn from_config(connector: Arc<dyn Connector>, config: &SftpConfig) -> Self {
        let connection = Connection::Host {
            connector,
            host: config.host.clone(),
            port: config.port,
        };
        Self::new(connection, &config.root)
            .with_credentials(Credentials {
                username: config.username.clone(),
                password: config.password.clone(),
            })
            .with_spool_threshold(config.spool_threshold)
    }

    /// Credentials used if the transport is not yet authenticated.
    pub fn with_credentials(self, credentials: Credentials) -> Self {
        self.remote.link.lock().credentials = credentials;
        self
    }

    pub fn with_spool_threshold(mut self, threshold: usize) -> Self {
        self.spool_threshold = threshold;
        self
    }

    /// The remote directory every path is confined to.
    pub fn root(&self) -> &str {
        &self.remote.root
    }

    /// Returns true once connected over a transport this filesystem dialed.
    pub fn owns_transport(&self) -> bool {
        self.remote.link.lock().owns_transport
    }

    /// Close the session, and the transport if owned. Further operations
    /// fail; open handles can no longer write back.
    pub fn close(&self) {
        self.remote.link.lock().shutdown();
    }

    fn query(&self, path: &str) -> VfsResult<Probe> {
        let npath = self.remote.resolve(path)?;
        self.remote.probe(&npath)
    }

    fn kind_of(&self, path: &str) -> Probe {
        match self.query(path) {
            Ok(probe) => probe,
            Err(e) => {
                tracing::debug!("stat {}: {}", path, e);
                Probe::Missing
            }
        }
    }

    fn buffer(&self, path: &str, mode: OpenMode) -> Box<dyn FileHandle> {
        let sink = Arc::clone(&self.remote) as Arc<dyn ContentSink>;
        Box::new(RemoteFileBuffer::new(sink, path, mode, self.spool_threshold))
    }

    /// Native rename, then probes on failure.
    fn rename_native(&self, src: &str, dst: &str) -> VfsResult<()> {
        let nsrc = self.remote.resolve(src)?;
        let ndst = self.remote.resolve(dst)?;
        let Err(e) = self.remote.call(|s| s.rename(&nsrc, &ndst)) else {
            return Ok(());
        };

        let outcome = probe::resolve_move(
            self.remote.probe(&nsrc)?,
            self.remote.probe(&ndst)?,
            self.remote.probe(vpath::dirname(&ndst))?,
        );
        tracing::debug!("rename {} -> {} failed ({}): {:?}", src, dst, e, outcome);
        Err(match outcome {
            MoveOutcome::SourceNotFound => VfsError::not_found(src),
            MoveOutcome::DestinationExists => VfsError::destination_exists(dst),
            MoveOutcome::MissingParent => VfsError::missing_parent(dst),
            MoveOutcome::Reraise => translate(src, e),
        })
    }
}

impl Filesystem for SftpFs {
    #[tracing::instrument(skip(self), name = "sftp.open")]
    fn open(&self, path: &str, mode: OpenMode) -> VfsResult<Box<dyn FileHandle>> {
        let npath = self.remote.resolve(path)?;
        let target = self.remote.probe(&npath)?;
        if target == Probe::Directory {
            return Err(VfsError::is_a_directory(path));
        }

        if mode.truncate || (mode.append && target == Probe::Missing) {
            self.remote.write_back(path, &mut io::empty())?;
            return Ok(self.buffer(path, mode));
        }
        if target == Probe::Missing {
            return Err(VfsError::not_found(path));
        }

        let mut body = self
            .remote
            .call(|s| s.read_file(&npath))
            .map_err(|e| translate(path, e))?;
        let sink = Arc::clone(&self.remote) as Arc<dyn ContentSink>;
        let buffer =
            RemoteFileBuffer::with_contents(sink, path, mode, self.spool_threshold, &mut body)?;
        Ok(Box::new(buffer))
    }

    fn isdir(&self, path: &str) -> bool {
        self.kind_of(path) == Probe::Directory
    }

    fn isfile(&self, path: &str) -> bool {
        self.kind_of(path) == Probe::File
    }

    fn exists(&self, path: &str) -> bool {
        self.kind_of(path).exists()
    }

    fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let npath = self.remote.resolve(path)?;
        match self.remote.call(|s| s.listdir(&npath)) {
            Ok(entries) => Ok(entries
                .into_iter()
                .map(|entry| {
                    let kind = if entry.stat.kind == RemoteKind::Directory {
                        FileType::Directory
                    } else {
                        FileType::File
                    };
                    DirEntry::new(entry.name, kind)
                })
                .collect()),
            Err(e) => match probe::resolve_dir(self.remote.probe(&npath)?, false) {
                DirOutcome::NotFound => Err(VfsError::directory_not_found(path)),
                DirOutcome::NotADirectory => Err(VfsError::not_a_directory(path)),
                DirOutcome::NotEmpty | DirOutcome::Reraise => Err(translate(path, e)),
            },
        }
    }

    fn getinfo(&self, path: &str) -> VfsResult<FileInfo> {
        let npath = self.remote.resolve(path)?;
        let stat = self
            .remote
            .call(|s| s.stat(&npath))
            .map_err(|e| translate(path, e))?;
        Ok(FileInfo {
            size: (stat.kind != RemoteKind::Directory).then_some(stat.size),
            created_time: None,
            modified_time: stat.mtime,
            accessed_time: stat.atime,
        })
    }

    /// Size as reported by the server, for any entry kind.
    fn getsize(&self, path: &str) -> VfsResult<u64> {
        let npath = self.remote.resolve(path)?;
        self.remote
            .call(|s| s.stat(&npath))
            .map(|stat| stat.size)
            .map_err(|e| translate(path, e))
    }

    #[tracing::instrument(skip(self), name = "sftp.makedir")]
    fn makedir(&self, path: &str, recursive: bool, allow_recreate: bool) -> VfsResult<()> {
        let npath = self.remote.resolve(path)?;
        if vpath::is_root(path) {
            return if allow_recreate {
                Ok(())
            } else {
                Err(VfsError::already_exists(path))
            };
        }
        let Err(e) = self.remote.call(|s| s.mkdir(&npath)) else {
            return Ok(());
        };

        let outcome = probe::resolve_makedir(
            self.remote.probe(&npath)?,
            self.remote.probe(vpath::dirname(&npath))?,
            recursive,
            allow_recreate,
        );
        tracing::debug!("mkdir {} failed ({}): {:?}", path, e, outcome);
        match outcome {
            MakedirOutcome::Accept => Ok(()),
            MakedirOutcome::AlreadyExists => Err(VfsError::already_exists(path)),
            MakedirOutcome::TargetIsFile => Err(VfsError::wrong_type(
                path,
                "there's already a file of that name",
            )),
            MakedirOutcome::ParentIsFile => {
                Err(VfsError::wrong_type(path, "parent is a regular file"))
            }
            MakedirOutcome::MissingParent => Err(VfsError::missing_parent(path)),
            MakedirOutcome::CreateParent => {
                let parent = vpath::dirname(&canonical(path)).to_string();
                self.makedir(&parent, true, true)?;
                self.makedir(path, false, allow_recreate)
            }
            MakedirOutcome::Reraise => Err(translate(path, e)),
        }
    }

    #[tracing::instrument(skip(self), name = "sftp.remove")]
    fn remove(&self, path: &str) -> VfsResult<()> {
        let npath = self.remote.resolve(path)?;
        let Err(e) = self.remote.call(|s| s.remove(&npath)) else {
            return Ok(());
        };
        match probe::resolve_remove(self.remote.probe(&npath)?) {
            RemoveOutcome::NotFound => Err(VfsError::not_found(path)),
            RemoveOutcome::IsDirectory => Err(VfsError::is_a_directory(path)),
            RemoveOutcome::Reraise => Err(translate(path, e)),
        }
    }

    #[tracing::instrument(skip(self), name = "sftp.removedir")]
    fn removedir(&self, path: &str, recursive: bool, force: bool) -> VfsResult<()> {
        let npath = self.remote.resolve(path)?;
        if vpath::is_root(path) {
            return Err(VfsError::invalid_path("can not remove the root directory"));
        }
        let path = canonical(path);

        if force {
            for entry in self.readdir(&path)? {
                let child = vpath::join(&path, &entry.name);
                match self.remove(&child) {
                    Ok(()) => {}
                    Err(e) if e.is_wrong_type() => self.removedir(&child, false, true)?,
                    Err(e) => return Err(e),
                }
            }
        }

        if let Err(e) = self.remote.call(|s| s.rmdir(&npath)) {
            let target = self.remote.probe(&npath)?;
            let has_children = target == Probe::Directory
                && self
                    .remote
                    .call(|s| s.listdir(&npath))
                    .is_ok_and(|entries| !entries.is_empty());
            return Err(match probe::resolve_dir(target, has_children) {
                DirOutcome::NotFound => VfsError::directory_not_found(path),
                DirOutcome::NotADirectory => VfsError::not_a_directory(path),
                DirOutcome::NotEmpty => VfsError::not_empty(path),
                DirOutcome::Reraise => translate(&path, e),
            });
        }

        if recursive {
            let parent = vpath::dirname(&path).to_string();
            if !vpath::is_root(&parent) {
                match self.removedir(&parent, true, false) {
                    Ok(()) | Err(VfsError::NotEmpty(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "sftp.rename")]
    fn rename(&self, src: &str, dst: &str) -> VfsResult<()> {
        if !vpath::is_same_dir(src, dst) {
            return Err(VfsError::invalid_path(format!(
                "rename target must be in the same directory (use move): {src} -> {dst}"
            )));
        }
        self.rename_native(src, dst)
    }

    fn setcontents(&self, path: &str, contents: &mut dyn Read) -> VfsResult<()> {
        self.remote.write_back(path, contents)
    }

    #[tracing::instrument(skip(self), name = "sftp.move_file")]
    fn move_file(&self, src: &str, dst: &str, overwrite: bool) -> VfsResult<()> {
        let source = self.query(src)?;
        if source == Probe::Directory {
            return Err(VfsError::wrong_type(src, "source is not a file"));
        }
        if self.remote.resolve(src)? == self.remote.resolve(dst)? {
            return match source {
                Probe::Missing => Err(VfsError::not_found(src)),
                _ => Ok(()),
            };
        }
        if overwrite && self.isfile(dst) {
            self.remove(dst)?;
        }
        self.rename_native(src, dst)
    }

    #[tracing::instrument(skip(self), name = "sftp.move_dir")]
    fn move_dir(&self, src: &str, dst: &str, overwrite: bool) -> VfsResult<()> {
        if self.query(src)? == Probe::File {
            return Err(VfsError::not_a_directory(src));
        }
        if overwrite && self.isdir(dst) {
            self.removedir(dst, false, true)?;
        }
        self.rename_native(src, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::types::ListOptions;
    use std::io::Write;

    fn setup(root: &str) -> (MemorySftpServer, SftpFs) {
        let server = MemorySftpServer::new();
        server.add_dir(root);
        let fs = SftpFs::new(Connection::Channel(server.session()), root);
        (server, fs)
    }

    #[test]
    fn test_paths_confined_to_root() {
        let (server, fs) = setup("/home/user");
        assert_eq!(fs.remote.resolve("a/b").unwrap(), "/home/user/a/b");
        assert_eq!(fs.remote.resolve("/a/../b").unwrap(), "/home/user/b");
        assert_eq!(fs.remote.resolve("/").unwrap(), "/home/user");

        let before = server.call_count();
        for escape in ["../etc/passwd", "a/../../..", "../user2/secret"] {
            assert!(matches!(
                fs.open(escape, OpenMode::read()),
                Err(VfsError::PathContainment(_))
            ));
            assert!(matches!(
                fs.remove(escape),
                Err(VfsError::PathContainment(_))
            ));
            assert!(!fs.exists(escape));
        }
        assert_eq!(server.call_count(), before);
    }

    #[test]
    fn test_write_read_round_trip() {
        let (server, fs) = setup("/srv");
        let mut f = fs.open("/greeting", OpenMode::write()).unwrap();
        f.write_all(b"hi there").unwrap();
        f.close().unwrap();

        assert_eq!(server.contents("/srv/greeting").unwrap(), b"hi there");
        assert_eq!(fs.getcontents("/greeting").unwrap(), b"hi there");
        assert!(fs.isfile("/greeting"));
        assert_eq!(fs.getsize("/greeting").unwrap(), 8);
    }

    #[test]
    fn test_open_errors() {
        let (_, fs) = setup("/srv");
        fs.makedir("/d", false, false).unwrap();
        assert!(fs.open("/d", OpenMode::read()).unwrap_err().is_wrong_type());
        assert!(fs.open("/missing", OpenMode::read()).unwrap_err().is_not_found());
        assert!(matches!(
            fs.open("/no/parent", OpenMode::write()),
            Err(VfsError::MissingParent(_))
        ));
    }

    #[test]
    fn test_makedir_disambiguation() {
        let (server, fs) = setup("/srv");
        fs.makedir("/d", false, false).unwrap();
        assert!(server.has("/srv/d"));

        assert!(fs.makedir("/d", false, false).unwrap_err().is_already_exists());
        fs.makedir("/d", false, true).unwrap();

        assert!(matches!(
            fs.makedir("/x/y/z", false, false),
            Err(VfsError::MissingParent(_))
        ));
        fs.makedir("/x/y/z", true, false).unwrap();
        assert!(fs.isdir("/x/y"));
        assert!(fs.isdir("/x/y/z"));

        server.add_file("/srv/plain", b"");
        assert!(fs.makedir("/plain", false, true).unwrap_err().is_wrong_type());
        assert!(fs.makedir("/plain/sub", false, false).unwrap_err().is_wrong_type());
        assert!(fs.makedir("/", false, false).unwrap_err().is_already_exists());
    }

    #[test]
    fn test_remove_disambiguation() {
        let (server, fs) = setup("/srv");
        server.add_dir("/srv/d");
        server.add_file("/srv/f", b"x");

        assert!(fs.remove("/d").unwrap_err().is_wrong_type());
        assert!(fs.remove("/nope").unwrap_err().is_not_found());
        fs.remove("/f").unwrap();
        assert!(!server.has("/srv/f"));
    }

    #[test]
    fn test_removedir() {
        let (server, fs) = setup("/srv");
        server.add_file("/srv/d/sub/deep", b"x");
        server.add_file("/srv/d/top", b"y");
        server.add_file("/srv/f", b"");

        assert!(matches!(
            fs.removedir("/d", false, false),
            Err(VfsError::NotEmpty(_))
        ));
        fs.removedir("/d", false, true).unwrap();
        assert!(!server.has("/srv/d"));
        assert!(!server.has("/srv/d/sub/deep"));

        assert!(fs.removedir("/d", false, false).unwrap_err().is_not_found());
        assert!(fs.removedir("/f", false, false).unwrap_err().is_wrong_type());
        assert!(matches!(
            fs.removedir("/", false, true),
            Err(VfsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_removedir_recursive() {
        let (server, fs) = setup("/srv");
        server.add_dir("/srv/a/b/c");
        server.add_file("/srv/a/keep", b"");

        fs.removedir("/a/b/c", true, false).unwrap();
        assert!(!server.has("/srv/a/b"));
        assert!(server.has("/srv/a"));
        assert!(server.has("/srv"));
    }

    #[test]
    fn test_rename_and_move() {
        let (server, fs) = setup("/srv");
        server.add_file("/srv/a/f", b"data");
        server.add_file("/srv/a/g", b"other");
        server.add_dir("/srv/b");

        assert!(matches!(
            fs.rename("/a/f", "/b/f"),
            Err(VfsError::InvalidPath(_))
        ));
        assert!(fs.rename("/a/f", "/a/g").unwrap_err().is_already_exists());
        assert!(fs.rename("/a/none", "/a/x").unwrap_err().is_not_found());
        fs.rename("/a/f", "/a/h").unwrap();

        assert!(matches!(
            fs.move_file("/a/h", "/nowhere/h", false),
            Err(VfsError::MissingParent(_))
        ));
        fs.move_file("/a/h", "/b/h", false).unwrap();
        assert_eq!(server.contents("/srv/b/h").unwrap(), b"data");

        assert!(fs.move_file("/a/g", "/b/h", false).unwrap_err().is_already_exists());
        fs.move_file("/a/g", "/b/h", true).unwrap();
        assert_eq!(server.contents("/srv/b/h").unwrap(), b"other");
        assert!(fs.move_file("/b", "/c", false).unwrap_err().is_wrong_type());
    }

    #[test]
    fn test_move_onto_itself_keeps_file() {
        let (server, fs) = setup("/srv");
        server.add_file("/srv/a/f", b"data");

        fs.move_file("/a/f", "/a/f", true).unwrap();
        fs.move_file("/a/f", "a/../a/f", false).unwrap();
        assert_eq!(server.contents("/srv/a/f").unwrap(), b"data");
        assert!(fs.move_file("/a/none", "/a/none", true).unwrap_err().is_not_found());
    }

    #[test]
    fn test_move_dir() {
        let (server, fs) = setup("/srv");
        server.add_file("/srv/src/f", b"1");
        server.add_file("/srv/dst/old", b"2");

        assert!(fs.move_dir("/src", "/dst", false).unwrap_err().is_already_exists());
        fs.move_dir("/src", "/dst", true).unwrap();
        assert_eq!(server.contents("/srv/dst/f").unwrap(), b"1");
        assert!(!server.has("/srv/dst/old"));
        assert!(!server.has("/srv/src"));
    }

    #[test]
    fn test_listdir_and_getinfo() {
        let (server, fs) = setup("/srv");
        server.add_file("/srv/d/b.txt", b"bb");
        server.add_file("/srv/d/a.txt", b"a");
        server.add_dir("/srv/d/z");

        let names = fs.listdir("/d", &ListOptions::new()).unwrap();
        assert_eq!(names, vec!["z", "a.txt", "b.txt"]);
        assert!(fs.listdir("/d/a.txt", &ListOptions::new()).unwrap_err().is_wrong_type());
        assert!(fs.listdir("/none", &ListOptions::new()).unwrap_err().is_not_found());

        let info = fs.getinfo("/d/b.txt").unwrap();
        assert_eq!(info.size, Some(2));
        assert!(info.modified_time.is_some());
        assert!(info.accessed_time.is_some());
        assert_eq!(fs.getinfo("/d").unwrap().size, None);
        assert!(fs.getinfo("/none").unwrap_err().is_not_found());
    }

    #[test]
    fn test_owned_transport_torn_down() {
        let server = MemorySftpServer::new();
        let config = SftpConfig {
            host: "files.example".to_string(),
            username: Some("deploy".to_string()),
            ..Default::default()
        };
        let fs = SftpFs::from_config(Arc::new(server.clone()), &config);
        assert!(server.transports().is_empty());

        assert!(fs.isdir("/"));
        assert!(fs.owns_transport());
        assert_eq!(server.open_sessions(), 1);

        fs.close();
        assert_eq!(server.open_sessions(), 0);
        assert!(server.transports()[0].is_closed());
        assert!(!fs.exists("/"));
    }

    #[test]
    fn test_borrowed_transport_left_open() {
        let server = MemorySftpServer::new();
        let transport = server.transport();
        let fs = SftpFs::new(Connection::Transport(transport.clone()), "/")
            .with_credentials(Credentials {
                username: Some("u".to_string()),
                password: None,
            });

        assert!(fs.isdir("/"));
        assert!(!fs.owns_transport());
        drop(fs);
        assert_eq!(server.open_sessions(), 0);
        assert!(!transport.is_closed());
    }

    #[test]
    fn test_failed_authentication() {
        let server = MemorySftpServer::new();
        let fs = SftpFs::new(Connection::Transport(server.transport()), "/");
        assert!(matches!(
            fs.makedir("/d", false, false),
            Err(VfsError::PermissionDenied(_))
        ));
    }
}
