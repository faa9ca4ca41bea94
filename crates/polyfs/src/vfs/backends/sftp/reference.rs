//! In-process SFTP server.
//!
//! Answers with the same coarse status codes a real server uses:
//! `NoSuchFile` when a path or its parent is missing, a generic `Failure`
//! for "already exists", "not empty" and "is a directory". Every session
//! request is counted so tests can assert that rejected paths never reach
//! the wire.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use parking_lot::Mutex;
use polyfs_path as vpath;

use super::session::{
    Connector, Credentials, RemoteEntry, RemoteKind, RemoteStat, SftpError, SftpSession,
    SshTransport, StatusCode,
};

#[derive(Debug, Clone)]
enum RemoteNode {
    Directory { mtime: SystemTime },
    File { data: Vec<u8>, mtime: SystemTime },
}

impl RemoteNode {
    fn stat(&self) -> RemoteStat {
        match self {
            RemoteNode::Directory { mtime } => RemoteStat {
                kind: RemoteKind::Directory,
                size: 4096,
                atime: Some(*mtime),
                mtime: Some(*mtime),
            },
            RemoteNode::File { data, mtime } => RemoteStat {
                kind: RemoteKind::File,
                size: data.len() as u64,
                atime: Some(*mtime),
                mtime: Some(*mtime),
            },
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, RemoteNode::Directory { .. })
    }
}

#[derive(Debug)]
struct ServerState {
    nodes: BTreeMap<String, RemoteNode>,
    calls: u64,
    open_sessions: usize,
    transports: Vec<Arc<MemoryTransport>>,
}

impl ServerState {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            RemoteNode::Directory {
                mtime: SystemTime::now(),
            },
        );
        Self {
            nodes,
            calls: 0,
            open_sessions: 0,
            transports: Vec::new(),
        }
    }

    fn children(&self, dir: &str) -> impl Iterator<Item = (&String, &RemoteNode)> + '_ {
        let dir = dir.to_string();
        self.nodes
            .iter()
            .filter(move |(path, _)| path.as_str() != "/" && vpath::dirname(path) == dir)
    }

    fn has_descendants(&self, dir: &str) -> bool {
        self.children(dir).next().is_some()
    }

    fn require_parent_dir(&self, path: &str) -> Result<(), SftpError> {
        match self.nodes.get(vpath::dirname(path)) {
            Some(node) if node.is_dir() => Ok(()),
            _ => Err(SftpError::no_such_file(path)),
        }
    }
}

/// A shared in-memory SFTP server. Clones see the same files.
#[derive(Debug, Clone)]
pub struct MemorySftpServer {
    state: Arc<Mutex<ServerState>>,
}

impl Default for MemorySftpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySftpServer {
    /// A server holding only `/`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState::new())),
        }
    }

    /// Open a session channel directly.
    pub fn session(&self) -> Box<dyn SftpSession> {
        self.state.lock().open_sessions += 1;
        Box::new(MemorySftpSession {
            server: self.clone(),
            closed: false,
        })
    }

    /// A fresh, unauthenticated transport.
    pub fn transport(&self) -> Arc<MemoryTransport> {
        let transport = Arc::new(MemoryTransport {
            server: Arc::downgrade(&self.state),
            authenticated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.state.lock().transports.push(Arc::clone(&transport));
        transport
    }

    /// Create a directory (and its ancestors) without counting a call.
    pub fn add_dir(&self, path: &str) {
        let mut state = self.state.lock();
        let mut current = String::from("/");
        for component in vpath::components(path) {
            current = vpath::join(&current, &component);
            state
                .nodes
                .entry(current.clone())
                .or_insert(RemoteNode::Directory {
                    mtime: SystemTime::now(),
                });
        }
    }

    /// Create a file (and its ancestors) without counting a call.
    pub fn add_file(&self, path: &str, data: &[u8]) {
        let path = vpath::abspath(&vpath::normpath(path));
        self.add_dir(vpath::dirname(&path));
        self.state.lock().nodes.insert(
            path,
            RemoteNode::File {
                data: data.to_vec(),
                mtime: SystemTime::now(),
            },
        );
    }

    /// A file's content, if it exists.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.state.lock().nodes.get(path) {
            Some(RemoteNode::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Returns true if any entry exists at `path`.
    pub fn has(&self, path: &str) -> bool {
        self.state.lock().nodes.contains_key(path)
    }

    /// Session requests served so far.
    pub fn call_count(&self) -> u64 {
        self.state.lock().calls
    }

    /// Sessions opened and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.state.lock().open_sessions
    }

    /// Every transport handed out so far.
    pub fn transports(&self) -> Vec<Arc<MemoryTransport>> {
        self.state.lock().transports.clone()
    }
}

impl Connector for MemorySftpServer {
    fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn SshTransport>, SftpError> {
        tracing::debug!("connecting to {}:{}", host, port);
        Ok(self.transport() as Arc<dyn SshTransport>)
    }
}

/// Transport to a [`MemorySftpServer`]. Authenticates any named user.
pub struct MemoryTransport {
    server: Weak<Mutex<ServerState>>,
    authenticated: AtomicBool,
    closed: AtomicBool,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("authenticated", &self.is_authenticated())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl MemoryTransport {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SshTransport for MemoryTransport {
    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    fn authenticate(&self, credentials: &Credentials) -> Result<(), SftpError> {
        if credentials.username.is_none() {
            return Err(SftpError::new(
                StatusCode::PermissionDenied,
                "authentication failed",
            ));
        }
        self.authenticated.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn open_session(&self) -> Result<Box<dyn SftpSession>, SftpError> {
        if self.is_closed() {
            return Err(SftpError::new(StatusCode::NoConnection, "transport closed"));
        }
        if !self.is_authenticated() {
            return Err(SftpError::new(
                StatusCode::PermissionDenied,
                "transport not authenticated",
            ));
        }
        let state = self
            .server
            .upgrade()
            .ok_or_else(|| SftpError::new(StatusCode::ConnectionLost, "server gone"))?;
        Ok(MemorySftpServer { state }.session())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MemorySftpSession {
    server: MemorySftpServer,
    closed: bool,
}

impl MemorySftpSession {
    /// Count the request and lock the server, failing on a closed channel.
    fn begin(&self) -> Result<parking_lot::MutexGuard<'_, ServerState>, SftpError> {
        if self.closed {
            return Err(SftpError::new(StatusCode::ConnectionLost, "session closed"));
        }
        let mut state = self.server.state.lock();
        state.calls += 1;
        Ok(state)
    }
}

impl SftpSession for MemorySftpSession {
    fn stat(&mut self, path: &str) -> Result<RemoteStat, SftpError> {
        let state = self.begin()?;
        state
            .nodes
            .get(path)
            .map(RemoteNode::stat)
            .ok_or_else(|| SftpError::no_such_file(path))
    }

    fn listdir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, SftpError> {
        let state = self.begin()?;
        match state.nodes.get(path) {
            None => Err(SftpError::no_such_file(path)),
            Some(node) if !node.is_dir() => Err(SftpError::failure("Failure")),
            Some(_) => Ok(state
                .children(path)
                .map(|(child, node)| RemoteEntry {
                    name: vpath::basename(child).to_string(),
                    stat: node.stat(),
                })
                .collect()),
        }
    }

    fn mkdir(&mut self, path: &str) -> Result<(), SftpError> {
        let mut state = self.begin()?;
        state.require_parent_dir(path)?;
        if state.nodes.contains_key(path) {
            return Err(SftpError::failure("Failure"));
        }
        state.nodes.insert(
            path.to_string(),
            RemoteNode::Directory {
                mtime: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn rmdir(&mut self, path: &str) -> Result<(), SftpError> {
        let mut state = self.begin()?;
        match state.nodes.get(path) {
            None => Err(SftpError::no_such_file(path)),
            Some(node) if !node.is_dir() => Err(SftpError::failure("Failure")),
            Some(_) if path == "/" || state.has_descendants(path) => {
                Err(SftpError::failure("Failure"))
            }
            Some(_) => {
                state.nodes.remove(path);
                Ok(())
            }
        }
    }

    fn remove(&mut self, path: &str) -> Result<(), SftpError> {
        let mut state = self.begin()?;
        match state.nodes.get(path) {
            None => Err(SftpError::no_such_file(path)),
            Some(node) if node.is_dir() => Err(SftpError::failure("Failure")),
            Some(_) => {
                state.nodes.remove(path);
                Ok(())
            }
        }
    }

    fn rename(&mut self, src: &str, dst: &str) -> Result<(), SftpError> {
        let mut state = self.begin()?;
        if !state.nodes.contains_key(src) {
            return Err(SftpError::no_such_file(src));
        }
        state.require_parent_dir(dst)?;
        if state.nodes.contains_key(dst) || vpath::is_prefix(src, dst) {
            return Err(SftpError::failure("Failure"));
        }

        let nested = format!("{src}/");
        let moved: Vec<String> = state
            .nodes
            .keys()
            .filter(|key| key.as_str() == src || key.starts_with(&nested))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = state.nodes.remove(&old) {
                let new = format!("{dst}{}", &old[src.len()..]);
                state.nodes.insert(new, node);
            }
        }
        Ok(())
    }

    fn read_file(&mut self, path: &str) -> Result<Box<dyn Read + Send>, SftpError> {
        let state = self.begin()?;
        match state.nodes.get(path) {
            None => Err(SftpError::no_such_file(path)),
            Some(RemoteNode::Directory { .. }) => Err(SftpError::failure("Failure")),
            Some(RemoteNode::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
        }
    }

    fn write_file(&mut self, path: &str, contents: &mut dyn Read) -> Result<(), SftpError> {
        let mut data = Vec::new();
        contents
            .read_to_end(&mut data)
            .map_err(|e| SftpError::failure(e.to_string()))?;

        let mut state = self.begin()?;
        state.require_parent_dir(path)?;
        if state.nodes.get(path).is_some_and(RemoteNode::is_dir) {
            return Err(SftpError::failure("Failure"));
        }
        state.nodes.insert(
            path.to_string(),
            RemoteNode::File {
                data,
                mtime: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut state = self.server.state.lock();
            state.open_sessions = state.open_sessions.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coarse_status_codes() {
        let server = MemorySftpServer::new();
        server.add_file("/home/f", b"x");
        let mut s = server.session();

        assert_eq!(s.mkdir("/missing/dir").unwrap_err().code, StatusCode::NoSuchFile);
        assert_eq!(s.mkdir("/home").unwrap_err().code, StatusCode::Failure);
        assert_eq!(s.rmdir("/home").unwrap_err().code, StatusCode::Failure);
        assert_eq!(s.remove("/home").unwrap_err().code, StatusCode::Failure);
        assert_eq!(s.stat("/nope").unwrap_err().code, StatusCode::NoSuchFile);
    }

    #[test]
    fn test_rename_moves_subtree() {
        let server = MemorySftpServer::new();
        server.add_file("/a/b/c", b"deep");
        let mut s = server.session();
        s.rename("/a", "/z").unwrap();
        assert_eq!(server.contents("/z/b/c").unwrap(), b"deep");
        assert!(!server.has("/a"));
        assert!(!server.has("/a/b"));
    }

    #[test]
    fn test_listdir_children_only() {
        let server = MemorySftpServer::new();
        server.add_file("/d/one", b"");
        server.add_file("/d/sub/two", b"");
        let mut s = server.session();
        let mut names: Vec<String> = s.listdir("/d").unwrap().into_iter().map(|e| e.name).collect();
        names.sort();
        assert_eq!(names, vec!["one", "sub"]);
    }

    #[test]
    fn test_closed_session_fails() {
        let server = MemorySftpServer::new();
        let mut s = server.session();
        assert_eq!(server.open_sessions(), 1);
        s.close();
        s.close();
        assert_eq!(server.open_sessions(), 0);
        assert_eq!(s.stat("/").unwrap_err().code, StatusCode::ConnectionLost);
    }

    #[test]
    fn test_call_count() {
        let server = MemorySftpServer::new();
        server.add_dir("/x");
        assert_eq!(server.call_count(), 0);
        let mut s = server.session();
        s.stat("/x").unwrap();
        let _ = s.stat("/y");
        assert_eq!(server.call_count(), 2);
    }
}
