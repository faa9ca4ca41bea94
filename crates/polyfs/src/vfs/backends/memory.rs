//! In-memory filesystem backend.
//!
//! Used for scratch space and testing. All data is ephemeral.
//!
//! The tree is an arena of nodes keyed by stable [`NodeId`]s. Directories
//! map child names to ids; handles remember the id of the node they
//! opened, so renames and moves never invalidate them. One mutex guards the
//! whole arena and every public operation holds it for its full duration.
//! Internal helpers take the already-locked [`Tree`] instead of locking
//! again.

use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use polyfs_path as vpath;
use uuid::Uuid;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::{FileHandle, Filesystem};
use crate::vfs::types::{DirEntry, FileInfo, FileType, OpenMode};

type NodeId = u64;

const ROOT: NodeId = 0;

#[derive(Debug)]
enum NodeKind {
    Directory(HashMap<String, NodeId>),
    /// `None` until the first write-back.
    File(Option<Vec<u8>>),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    created: SystemTime,
    modified: SystemTime,
    /// Logical write lock: one count per open handle.
    locks: usize,
    open_handles: HashSet<Uuid>,
}

impl Node {
    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory(_))
    }

    fn is_locked(&self) -> bool {
        self.locks > 0
    }

    fn children(&self) -> Option<&HashMap<String, NodeId>> {
        match &self.kind {
            NodeKind::Directory(children) => Some(children),
            NodeKind::File(_) => None,
        }
    }
}

/// Per-handle state, shared between the handle and the tree's registry so
/// the tree can flush or orphan handles it does not own.
#[derive(Debug)]
struct HandleState {
    node: NodeId,
    path: String,
    mode: OpenMode,
    buffer: Cursor<Vec<u8>>,
    closed: bool,
}

#[derive(Debug)]
struct Tree {
    nodes: HashMap<NodeId, Node>,
    next_id: NodeId,
    last_stamp: SystemTime,
    handles: HashMap<Uuid, Arc<Mutex<HandleState>>>,
}

impl Tree {
    fn new() -> Self {
        let now = SystemTime::now();
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT,
            Node {
                kind: NodeKind::Directory(HashMap::new()),
                created: now,
                modified: now,
                locks: 0,
                open_handles: HashSet::new(),
            },
        );
        Self {
            nodes,
            next_id: ROOT + 1,
            last_stamp: now,
            handles: HashMap::new(),
        }
    }

    /// Wall-clock time, clamped so stamps never go backwards.
    fn stamp(&mut self) -> SystemTime {
        let now = SystemTime::now();
        if now > self.last_stamp {
            self.last_stamp = now;
        }
        self.last_stamp
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let now = self.stamp();
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                kind,
                created: now,
                modified: now,
                locks: 0,
                open_handles: HashSet::new(),
            },
        );
        id
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn child(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        self.node(dir)?.children()?.get(name).copied()
    }

    /// Walk a canonical path component by component from the root.
    fn lookup(&self, path: &str) -> Option<NodeId> {
        let mut current = ROOT;
        for component in vpath::components(path) {
            current = self.child(current, &component)?;
        }
        Some(current)
    }

    fn is_dir(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(Node::is_dir)
    }

    fn is_empty_dir(&self, id: NodeId) -> bool {
        self.node(id)
            .and_then(Node::children)
            .is_some_and(HashMap::is_empty)
    }

    fn attach(&mut self, dir: NodeId, name: &str, id: NodeId) {
        if let Some(Node {
            kind: NodeKind::Directory(children),
            ..
        }) = self.nodes.get_mut(&dir)
        {
            children.insert(name.to_string(), id);
        }
    }

    fn detach(&mut self, dir: NodeId, name: &str) -> Option<NodeId> {
        match self.nodes.get_mut(&dir) {
            Some(Node {
                kind: NodeKind::Directory(children),
                ..
            }) => children.remove(name),
            _ => None,
        }
    }

    fn store(&mut self, id: NodeId, data: Vec<u8>) {
        let now = self.stamp();
        if let Some(node) = self.nodes.get_mut(&id) {
            if let NodeKind::File(payload) = &mut node.kind {
                *payload = Some(data);
                node.modified = now;
            }
        }
    }

    /// Register a new handle on a file node, taking one lock count.
    fn register(&mut self, id: NodeId, path: &str, mode: OpenMode, data: Vec<u8>) -> MemoryHandleParts {
        let handle_id = Uuid::new_v4();
        let mut buffer = Cursor::new(data);
        if mode.append {
            buffer.set_position(buffer.get_ref().len() as u64);
        }
        let state = Arc::new(Mutex::new(HandleState {
            node: id,
            path: path.to_string(),
            mode,
            buffer,
            closed: false,
        }));
        if let Some(node) = self.nodes.get_mut(&id) {
            node.locks += 1;
            node.open_handles.insert(handle_id);
        }
        self.handles.insert(handle_id, Arc::clone(&state));
        MemoryHandleParts {
            id: handle_id,
            state,
        }
    }

    /// Release a handle: write back its buffer (if writable), drop it from
    /// its node's open set and return its lock count.
    fn release(&mut self, handle_id: Uuid, state: &mut HandleState) {
        if state.mode.is_writable() {
            let data = std::mem::take(state.buffer.get_mut());
            self.store(state.node, data);
        }
        if let Some(node) = self.nodes.get_mut(&state.node) {
            node.open_handles.remove(&handle_id);
            debug_assert!(node.locks > 0, "lock / unlock mismatch");
            node.locks = node.locks.saturating_sub(1);
        }
        self.handles.remove(&handle_id);
        state.closed = true;
        state.buffer = Cursor::new(Vec::new());
    }

    /// Force-close every open handle on a node. Unflushed content is lost.
    fn orphan(&mut self, id: NodeId) {
        let open: Vec<Uuid> = match self.nodes.get_mut(&id) {
            Some(node) => node.open_handles.drain().collect(),
            None => return,
        };
        for handle_id in open {
            if let Some(shared) = self.handles.remove(&handle_id) {
                let mut state = shared.lock();
                tracing::warn!("orphaning open handle on {}", state.path);
                state.closed = true;
                state.buffer = Cursor::new(Vec::new());
            }
            if let Some(node) = self.nodes.get_mut(&id) {
                node.locks = node.locks.saturating_sub(1);
            }
        }
    }

    /// Drop a detached node and all of its descendants from the arena,
    /// orphaning any handles still open on them.
    fn purge(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            self.orphan(current);
            if let Some(Node {
                kind: NodeKind::Directory(children),
                ..
            }) = self.nodes.remove(&current)
            {
                pending.extend(children.into_values());
            }
        }
    }

    /// Publish the buffers of handles open on `id` and repoint every handle
    /// recorded under `src` at `dst`.
    fn retarget_handles(&mut self, id: NodeId, src: &str, dst: &str) {
        let on_node: Vec<Uuid> = self
            .node(id)
            .map(|n| n.open_handles.iter().copied().collect())
            .unwrap_or_default();
        for handle_id in on_node {
            let Some(shared) = self.handles.get(&handle_id).cloned() else {
                continue;
            };
            let state = shared.lock();
            if state.mode.is_writable() {
                let data = state.buffer.get_ref().clone();
                self.store(id, data);
            }
        }

        let nested = format!("{src}/");
        for shared in self.handles.values() {
            let mut state = shared.lock();
            if state.path == src {
                state.path = dst.to_string();
            } else if let Some(rest) = state.path.strip_prefix(&nested) {
                state.path = vpath::join(dst, rest);
            }
        }
    }

    /// Resolve the parent directory of `path`, creating missing ancestors.
    fn ensure_dir(&mut self, dir: &str, leaf: &str) -> VfsResult<NodeId> {
        let mut current = ROOT;
        for component in vpath::components(dir) {
            current = match self.child(current, &component) {
                Some(id) if self.is_dir(id) => id,
                Some(_) => {
                    return Err(VfsError::wrong_type(
                        leaf,
                        "can not create a directory, because path references a file",
                    ));
                }
                None => {
                    let id = self.alloc(NodeKind::Directory(HashMap::new()));
                    self.attach(current, &component, id);
                    id
                }
            };
        }
        Ok(current)
    }
}

struct MemoryHandleParts {
    id: Uuid,
    state: Arc<Mutex<HandleState>>,
}

/// Canonical absolute form of a virtual path.
fn canonical(path: &str) -> String {
    vpath::normpath(&vpath::abspath(path))
}

/// In-memory filesystem backend.
///
/// Cheap to clone; clones share the same tree. All data is lost when the
/// last clone and the last open handle are dropped.
#[derive(Clone)]
pub struct MemoryFs {
    tree: Arc<Mutex<Tree>>,
}

impl std::fmt::Debug for MemoryFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryFs").field("tree", &"<locked>").finish()
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree::new())),
        }
    }

    /// Number of handles currently open across the whole tree.
    pub fn open_handle_count(&self) -> usize {
        self.tree.lock().handles.len()
    }

    fn handle(&self, parts: MemoryHandleParts) -> Box<dyn FileHandle> {
        Box::new(MemoryFile {
            id: parts.id,
            tree: Arc::clone(&self.tree),
            state: parts.state,
        })
    }
}

impl Filesystem for MemoryFs {
    #[tracing::instrument(skip(self), name = "memory.open")]
    fn open(&self, path: &str, mode: OpenMode) -> VfsResult<Box<dyn FileHandle>> {
        let path = canonical(path);
        let mut tree = self.tree.lock();

        let (dir, name) = vpath::split(&path);
        if name.is_empty() {
            return Err(VfsError::is_a_directory(path));
        }
        let parent = tree
            .lookup(dir)
            .filter(|&id| tree.is_dir(id))
            .ok_or_else(|| VfsError::not_found(&path))?;
        let existing = tree.child(parent, name);

        let (id, data) = if mode.truncate {
            let id = match existing {
                Some(id) if tree.is_dir(id) => return Err(VfsError::is_a_directory(path)),
                Some(id) => id,
                None => {
                    let id = tree.alloc(NodeKind::File(None));
                    tree.attach(parent, name, id);
                    id
                }
            };
            if tree.node(id).is_some_and(Node::is_locked) {
                return Err(VfsError::locked(path));
            }
            (id, Vec::new())
        } else {
            let id = existing.ok_or_else(|| VfsError::not_found(&path))?;
            let node = tree.node(id).ok_or_else(|| VfsError::not_found(&path))?;
            let data = match &node.kind {
                NodeKind::Directory(_) => return Err(VfsError::is_a_directory(path)),
                NodeKind::File(data) => data.clone().unwrap_or_default(),
            };
            if mode.is_writable() && node.is_locked() {
                return Err(VfsError::locked(path));
            }
            (id, data)
        };

        let parts = tree.register(id, &path, mode, data);
        Ok(self.handle(parts))
    }

    fn isdir(&self, path: &str) -> bool {
        let tree = self.tree.lock();
        tree.lookup(&canonical(path)).is_some_and(|id| tree.is_dir(id))
    }

    fn isfile(&self, path: &str) -> bool {
        let tree = self.tree.lock();
        tree.lookup(&canonical(path))
            .is_some_and(|id| !tree.is_dir(id))
    }

    fn exists(&self, path: &str) -> bool {
        self.tree.lock().lookup(&canonical(path)).is_some()
    }

    fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let path = canonical(path);
        let tree = self.tree.lock();
        let id = tree
            .lookup(&path)
            .ok_or_else(|| VfsError::directory_not_found(&path))?;
        let children = tree
            .node(id)
            .and_then(Node::children)
            .ok_or_else(|| VfsError::not_a_directory(&path))?;

        let mut entries: Vec<DirEntry> = children
            .iter()
            .map(|(name, &child)| {
                let kind = if tree.is_dir(child) {
                    FileType::Directory
                } else {
                    FileType::File
                };
                DirEntry::new(name.clone(), kind)
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn getinfo(&self, path: &str) -> VfsResult<FileInfo> {
        let path = canonical(path);
        let tree = self.tree.lock();
        let node = tree
            .lookup(&path)
            .and_then(|id| tree.node(id))
            .ok_or_else(|| VfsError::not_found(&path))?;

        let size = match &node.kind {
            NodeKind::File(data) => Some(data.as_ref().map_or(0, |d| d.len() as u64)),
            NodeKind::Directory(_) => None,
        };
        Ok(FileInfo {
            size,
            created_time: Some(node.created),
            modified_time: Some(node.modified),
            accessed_time: None,
        })
    }

    #[tracing::instrument(skip(self), name = "memory.makedir")]
    fn makedir(&self, path: &str, recursive: bool, allow_recreate: bool) -> VfsResult<()> {
        let path = canonical(path);
        let mut tree = self.tree.lock();

        let (dir, name) = vpath::split(&path);
        if name.is_empty() {
            return if allow_recreate {
                Ok(())
            } else {
                Err(VfsError::already_exists(path))
            };
        }

        let parent = if recursive {
            tree.ensure_dir(dir, &path)?
        } else {
            match tree.lookup(dir) {
                Some(id) if tree.is_dir(id) => id,
                Some(_) => {
                    return Err(VfsError::wrong_type(
                        path,
                        "can not create a directory, because path references a file",
                    ));
                }
                None => return Err(VfsError::missing_parent(path)),
            }
        };

        match tree.child(parent, name) {
            Some(id) if tree.is_dir(id) => {
                if allow_recreate {
                    Ok(())
                } else {
                    Err(VfsError::already_exists(path))
                }
            }
            Some(_) => Err(VfsError::wrong_type(
                path,
                "can not create a directory, because path references a file",
            )),
            None => {
                let id = tree.alloc(NodeKind::Directory(HashMap::new()));
                tree.attach(parent, name, id);
                Ok(())
            }
        }
    }

    #[tracing::instrument(skip(self), name = "memory.remove")]
    fn remove(&self, path: &str) -> VfsResult<()> {
        let path = canonical(path);
        let mut tree = self.tree.lock();

        let id = tree.lookup(&path).ok_or_else(|| VfsError::not_found(&path))?;
        if tree.is_dir(id) {
            return Err(VfsError::is_a_directory(path));
        }
        if tree.node(id).is_some_and(Node::is_locked) {
            tree.orphan(id);
        }

        let (dir, name) = vpath::split(&path);
        if let Some(parent) = tree.lookup(dir) {
            tree.detach(parent, name);
        }
        tree.purge(id);
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "memory.removedir")]
    fn removedir(&self, path: &str, recursive: bool, force: bool) -> VfsResult<()> {
        let path = canonical(path);
        if vpath::is_root(&path) {
            return Err(VfsError::invalid_path("can not remove the root directory"));
        }
        let mut tree = self.tree.lock();

        let id = tree
            .lookup(&path)
            .ok_or_else(|| VfsError::directory_not_found(&path))?;
        let node = tree
            .node(id)
            .ok_or_else(|| VfsError::directory_not_found(&path))?;
        if node.is_locked() {
            return Err(VfsError::locked(path));
        }
        let children = node
            .children()
            .ok_or_else(|| VfsError::not_a_directory(&path))?;
        if !children.is_empty() && !force {
            return Err(VfsError::not_empty(path));
        }

        let (dir, name) = vpath::split(&path);
        if let Some(parent) = tree.lookup(dir) {
            tree.detach(parent, name);
        }
        tree.purge(id);

        if recursive {
            let mut current = dir.to_string();
            while !vpath::is_root(&current) {
                let Some(ancestor) = tree.lookup(&current) else {
                    break;
                };
                if !tree.is_empty_dir(ancestor) {
                    break;
                }
                let (up, name) = vpath::split(&current);
                if let Some(parent) = tree.lookup(up) {
                    tree.detach(parent, name);
                }
                tree.purge(ancestor);
                current = up.to_string();
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "memory.rename")]
    fn rename(&self, src: &str, dst: &str) -> VfsResult<()> {
        if !vpath::is_same_dir(src, dst) {
            return Err(VfsError::invalid_path(format!(
                "rename target must be in the same directory (use move): {src} -> {dst}"
            )));
        }
        let src = canonical(src);
        let dst = canonical(dst);
        let (dir, src_name) = vpath::split(&src);
        let dst_name = vpath::basename(&dst);
        if src_name.is_empty() || dst_name.is_empty() {
            return Err(VfsError::invalid_path("can not rename the root directory"));
        }

        let mut tree = self.tree.lock();
        let id = tree.lookup(&src).ok_or_else(|| VfsError::not_found(&src))?;
        if tree.lookup(&dst).is_some() {
            return Err(VfsError::destination_exists(dst));
        }

        tree.retarget_handles(id, &src, &dst);
        let parent = tree
            .lookup(dir)
            .ok_or_else(|| VfsError::not_found(&src))?;
        tree.detach(parent, src_name);
        tree.attach(parent, dst_name, id);
        Ok(())
    }

    fn desc(&self, path: &str) -> String {
        if self.isdir(path) {
            "Memory dir".to_string()
        } else if self.isfile(path) {
            "Memory file object".to_string()
        } else {
            "No description available".to_string()
        }
    }

    #[tracing::instrument(skip(self), name = "memory.move_file")]
    fn move_file(&self, src: &str, dst: &str, overwrite: bool) -> VfsResult<()> {
        let src = canonical(src);
        let dst = canonical(dst);
        let mut tree = self.tree.lock();

        let id = tree.lookup(&src).ok_or_else(|| VfsError::not_found(&src))?;
        if tree.is_dir(id) {
            return Err(VfsError::wrong_type(src, "source is not a file"));
        }
        move_node(&mut tree, id, &src, &dst, overwrite)
    }

    #[tracing::instrument(skip(self), name = "memory.move_dir")]
    fn move_dir(&self, src: &str, dst: &str, overwrite: bool) -> VfsResult<()> {
        let src = canonical(src);
        let dst = canonical(dst);
        if vpath::is_root(&src) || vpath::is_prefix(&src, &dst) {
            return Err(VfsError::invalid_path(format!(
                "can not move {src} into itself: {dst}"
            )));
        }
        let mut tree = self.tree.lock();

        let id = tree
            .lookup(&src)
            .ok_or_else(|| VfsError::directory_not_found(&src))?;
        if !tree.is_dir(id) {
            return Err(VfsError::not_a_directory(src));
        }
        move_node(&mut tree, id, &src, &dst, overwrite)
    }
}

/// Re-parent `id` from `src` to `dst` under the already-held tree lock.
///
/// An existing destination of the same kind is replaced (and its handles
/// orphaned) only with `overwrite`.
fn move_node(tree: &mut Tree, id: NodeId, src: &str, dst: &str, overwrite: bool) -> VfsResult<()> {
    if src == dst {
        return Ok(());
    }
    let (dst_dir, dst_name) = vpath::split(dst);
    if dst_name.is_empty() {
        return Err(VfsError::destination_exists(dst));
    }
    let parent = tree
        .lookup(dst_dir)
        .filter(|&p| tree.is_dir(p))
        .ok_or_else(|| VfsError::missing_parent(dst))?;

    if let Some(existing) = tree.child(parent, dst_name) {
        if !overwrite {
            return Err(VfsError::destination_exists(dst));
        }
        if tree.is_dir(existing) != tree.is_dir(id) {
            return Err(VfsError::wrong_type(dst, "destination is of a different type"));
        }
        tree.detach(parent, dst_name);
        tree.purge(existing);
    }

    tree.retarget_handles(id, src, dst);
    let (src_dir, src_name) = vpath::split(src);
    if let Some(old_parent) = tree.lookup(src_dir) {
        tree.detach(old_parent, src_name);
    }
    tree.attach(parent, dst_name, id);
    Ok(())
}

/// A handle on a [`MemoryFs`] file.
///
/// Holds its node's id, never a reference into the tree.
struct MemoryFile {
    id: Uuid,
    tree: Arc<Mutex<Tree>>,
    state: Arc<Mutex<HandleState>>,
}

impl std::fmt::Debug for MemoryFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryFile")
            .field("path", &state.path)
            .field("closed", &state.closed)
            .finish()
    }
}

fn not_open_for(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("file not open for {what}"),
    )
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(0);
        }
        if !state.mode.read {
            return Err(not_open_for("reading"));
        }
        state.buffer.read(buf)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(0);
        }
        if !state.mode.is_writable() {
            return Err(not_open_for("writing"));
        }
        if state.mode.append {
            state.buffer.seek(SeekFrom::End(0))?;
        }
        state.buffer.write(buf)
    }

    /// Publish the buffer to the tree without closing or unlocking.
    fn flush(&mut self) -> io::Result<()> {
        let mut tree = self.tree.lock();
        let state = self.state.lock();
        if state.closed || !state.mode.is_writable() {
            return Ok(());
        }
        tree.store(state.node, state.buffer.get_ref().clone());
        Ok(())
    }
}

impl Seek for MemoryFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(0);
        }
        state.buffer.seek(pos)
    }
}

impl FileHandle for MemoryFile {
    fn close(&mut self) -> VfsResult<()> {
        let mut tree = self.tree.lock();
        let mut state = self.state.lock();
        if !state.closed {
            tree.release(self.id, &mut state);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Drop for MemoryFile {
    fn drop(&mut self) {
        if !self.is_closed() {
            tracing::debug!("closing dropped handle {}", self.id);
            let _ = self.close();
        }
    }
}
