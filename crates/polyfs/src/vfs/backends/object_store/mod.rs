//! Flat object-store backend.
//!
//! Hierarchical paths map to keys under a fixed prefix, joined with a
//! configurable separator. Directories are emulated: a directory exists if
//! any key lives under `path + separator`, and `makedir` writes a
//! zero-length marker object at `path + separator` so empty directories
//! stay listable.
//!
//! Every mutation is followed by reconciliation (see [`KeySync`]) so
//! callers can read their own writes on eventually consistent stores.
//! Cross-directory moves are copy-then-delete and not atomic: a failure
//! between the two phases leaves both source and destination.

mod client;
mod reference;
mod sync;

pub use client::{ObjectHead, ObjectListing, ObjectStoreClient, StoreError};
pub use reference::MemoryObjectStore;
pub use sync::{KeySync, DEFAULT_POLL_INTERVAL, DEFAULT_SYNC_TIMEOUT};

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;

use polyfs_path as vpath;

use crate::config::ObjectStoreConfig;
use crate::vfs::buffer::{ContentSink, RemoteFileBuffer, DEFAULT_SPOOL_THRESHOLD};
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::{FileHandle, Filesystem};
use crate::vfs::types::{DirEntry, FileInfo, FileType, OpenMode};

/// Shared state behind an [`ObjectStoreFs`]; also the upload sink of its
/// open buffers.
#[derive(Clone)]
struct Store {
    client: Arc<dyn ObjectStoreClient>,
    bucket: String,
    prefix: Vec<String>,
    separator: String,
    key_sync: KeySync,
    poll_interval: Duration,
    spool_threshold: usize,
}

impl Store {
    /// Key for a virtual path, without a trailing separator.
    fn key(&self, path: &str) -> String {
        let mut parts = self.prefix.clone();
        parts.extend(vpath::components(&vpath::abspath(path)));
        parts.join(&self.separator)
    }

    /// Key prefix under which a directory's members live.
    fn dir_key(&self, path: &str) -> String {
        let key = self.key(path);
        if key.is_empty() {
            key
        } else {
            key + &self.separator
        }
    }

    fn list(&self, prefix: &str, delimited: bool) -> VfsResult<ObjectListing> {
        let delimiter = delimited.then_some(self.separator.as_str());
        tracing::debug!("list {:?} (delimited: {})", prefix, delimited);
        Ok(self.client.list(prefix, delimiter)?)
    }

    fn put_synced(&self, key: &str, body: &mut dyn Read) -> VfsResult<ObjectHead> {
        let written = self.client.put(key, body)?;
        Ok(sync::await_etag(
            self.client.as_ref(),
            &written,
            self.key_sync,
            self.poll_interval,
        )?)
    }

    fn delete_synced(&self, key: &str) -> VfsResult<()> {
        self.client.delete(key)?;
        Ok(sync::await_absence(
            self.client.as_ref(),
            key,
            self.key_sync,
            self.poll_interval,
        )?)
    }

    fn copy_synced(&self, src: &str, dst: &str) -> Result<ObjectHead, StoreError> {
        let written = self.client.copy(src, dst)?;
        sync::await_etag(self.client.as_ref(), &written, self.key_sync, self.poll_interval)
    }

    fn isdir(&self, path: &str) -> bool {
        if vpath::is_root(path) {
            return true;
        }
        match self.list(&self.dir_key(path), true) {
            Ok(listing) => !listing.is_empty(),
            Err(e) => {
                tracing::debug!("isdir {}: {}", path, e);
                false
            }
        }
    }

    fn isfile(&self, path: &str) -> bool {
        if vpath::is_root(path) {
            return false;
        }
        match self.client.head(&self.key(path)) {
            Ok(head) => head.is_some(),
            Err(e) => {
                tracing::debug!("isfile {}: {}", path, e);
                false
            }
        }
    }
}

impl ContentSink for Store {
    fn upload(&self, path: &str, contents: &mut dyn Read) -> VfsResult<()> {
        self.put_synced(&self.key(path), contents).map(|_| ())
    }
}

/// A filesystem stored in a flat object store.
///
/// Opened files are staged in local buffers; changes reach the store only
/// on flush or close.
#[derive(Clone)]
pub struct ObjectStoreFs {
    store: Arc<Store>,
}

impl std::fmt::Debug for ObjectStoreFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<ObjectStoreFs: {}:{}>",
            self.store.bucket,
            self.prefix()
        )
    }
}

impl ObjectStoreFs {
    /// Create a backend over `client` rooted at the top of `bucket`.
    pub fn new(client: Arc<dyn ObjectStoreClient>, bucket: impl Into<String>) -> Self {
        Self {
            store: Arc::new(Store {
                client,
                bucket: bucket.into(),
                prefix: Vec::new(),
                separator: "/".to_string(),
                key_sync: KeySync::default(),
                poll_interval: DEFAULT_POLL_INTERVAL,
                spool_threshold: DEFAULT_SPOOL_THRESHOLD,
            }),
        }
    }

    /// Build from configuration and an already-connected client.
    pub fn from_config(client: Arc<dyn ObjectStoreClient>, config: &ObjectStoreConfig) -> Self {
        Self::new(client, config.bucket.clone())
            .with_separator(config.separator.clone())
            .with_prefix(&config.prefix)
            .with_key_sync(config.key_sync)
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms))
            .with_spool_threshold(config.spool_threshold)
    }

    /// Store everything under `prefix` (a virtual path, `/`-separated).
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        Arc::make_mut(&mut self.store).prefix = vpath::components(&vpath::abspath(prefix));
        self
    }

    /// Join key components with `separator` instead of `/`.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.store).separator = separator.into();
        self
    }

    pub fn with_key_sync(mut self, key_sync: KeySync) -> Self {
        Arc::make_mut(&mut self.store).key_sync = key_sync;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        Arc::make_mut(&mut self.store).poll_interval = interval;
        self
    }

    pub fn with_spool_threshold(mut self, threshold: usize) -> Self {
        Arc::make_mut(&mut self.store).spool_threshold = threshold;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.store.bucket
    }

    /// The normalized key prefix, ending in the separator unless empty.
    pub fn prefix(&self) -> String {
        self.store.dir_key("/")
    }

    /// The object key a virtual path maps to.
    pub fn key_for(&self, path: &str) -> String {
        self.store.key(path)
    }

    /// Total size in bytes of every object under the prefix.
    pub fn total_size(&self) -> VfsResult<u64> {
        let listing = self.store.list(&self.prefix(), false)?;
        Ok(listing.objects.iter().map(|o| o.size).sum())
    }

    fn sink(&self) -> Arc<dyn ContentSink> {
        Arc::clone(&self.store) as Arc<dyn ContentSink>
    }

    fn require_parent(&self, path: &str) -> VfsResult<()> {
        if self.store.isdir(vpath::dirname(&canonical(path))) {
            Ok(())
        } else {
            Err(VfsError::missing_parent(path))
        }
    }

    /// Copy `src` to `dst`, or into `dst` under the source's name when it
    /// is a directory (the root always is). Returns the key written; equal
    /// to the source key when source and destination are the same file.
    fn copy_object(&self, src: &str, dst: &str, overwrite: bool) -> VfsResult<String> {
        let store = &self.store;
        let src_key = store.key(src);
        let mut dst = canonical(dst);
        if canonical(src) == dst {
            return self.existing_file(src).map(|_| src_key);
        }
        let mut dst_key = store.key(&dst);
        let dst_dir_key = store.dir_key(&dst);

        let names = if vpath::is_root(&dst) {
            Vec::new()
        } else {
            store.list(&dst_key, true)?.names()
        };
        let mut dst_ok = false;
        if names.contains(&dst_key) {
            if !overwrite {
                return Err(VfsError::destination_exists(dst));
            }
            dst_ok = true;
        } else if vpath::is_root(&dst) || names.contains(&dst_dir_key) {
            dst = vpath::join(&dst, vpath::basename(&canonical(src)));
            dst_key = store.key(&dst);
            if dst_key == src_key {
                return self.existing_file(src).map(|_| src_key);
            }
            if !overwrite && store.client.head(&dst_key)?.is_some() {
                return Err(VfsError::destination_exists(dst));
            }
            dst_ok = true;
        }
        if !dst_ok {
            self.require_parent(&dst)?;
        }

        match store.copy_synced(&src_key, &dst_key) {
            Ok(_) => Ok(dst_key),
            Err(StoreError::NoSuchKey(_)) if store.isdir(src) => {
                Err(VfsError::wrong_type(src, "source is not a file"))
            }
            Err(StoreError::NoSuchKey(_)) => Err(VfsError::not_found(src)),
            Err(e) => Err(e.into()),
        }
    }

    fn existing_file(&self, path: &str) -> VfsResult<()> {
        if self.store.isfile(path) {
            Ok(())
        } else if self.store.isdir(path) {
            Err(VfsError::wrong_type(path, "source is not a file"))
        } else {
            Err(VfsError::not_found(path))
        }
    }
}

fn canonical(path: &str) -> String {
    vpath::normpath(&vpath::abspath(path))
}

impl Filesystem for ObjectStoreFs {
    #[tracing::instrument(skip(self), name = "object_store.open")]
    fn open(&self, path: &str, mode: OpenMode) -> VfsResult<Box<dyn FileHandle>> {
        let store = &self.store;
        if vpath::is_root(path) {
            return Err(VfsError::is_a_directory(path));
        }
        let key = store.key(path);

        if mode.truncate {
            if store.isdir(path) {
                return Err(VfsError::is_a_directory(path));
            }
            self.require_parent(path)?;
            store.put_synced(&key, &mut io::empty())?;
            let buffer = RemoteFileBuffer::new(self.sink(), path, mode, store.spool_threshold);
            return Ok(Box::new(buffer));
        }

        match store.client.get(&key) {
            Ok(mut body) => {
                let buffer = RemoteFileBuffer::with_contents(
                    self.sink(),
                    path,
                    mode,
                    store.spool_threshold,
                    &mut body,
                )?;
                Ok(Box::new(buffer))
            }
            Err(StoreError::NoSuchKey(_)) => {
                if store.isdir(path) {
                    return Err(VfsError::is_a_directory(path));
                }
                if !mode.append {
                    return Err(VfsError::not_found(path));
                }
                self.require_parent(path)?;
                store.put_synced(&key, &mut io::empty())?;
                let buffer = RemoteFileBuffer::new(self.sink(), path, mode, store.spool_threshold);
                Ok(Box::new(buffer))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn isdir(&self, path: &str) -> bool {
        self.store.isdir(path)
    }

    fn isfile(&self, path: &str) -> bool {
        self.store.isfile(path)
    }

    /// One delimited listing answers both questions.
    fn exists(&self, path: &str) -> bool {
        if vpath::is_root(path) {
            return true;
        }
        let key = self.store.key(path);
        let dir_key = self.store.dir_key(path);
        match self.store.list(&key, true) {
            Ok(listing) => listing
                .names()
                .iter()
                .any(|name| *name == key || *name == dir_key),
            Err(e) => {
                tracing::debug!("exists {}: {}", path, e);
                false
            }
        }
    }

    fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let store = &self.store;
        let dir_key = store.dir_key(path);
        let names = store.list(&dir_key, true)?.names();

        if names.is_empty() && !vpath::is_root(path) {
            if store.isfile(path) {
                return Err(VfsError::not_a_directory(path));
            }
            return Err(VfsError::directory_not_found(path));
        }

        // A name that is both a file and a directory lists once, as a directory.
        let mut entries: BTreeMap<String, FileType> = BTreeMap::new();
        for name in &names {
            let rest = &name[dir_key.len()..];
            if rest.is_empty() {
                continue;
            }
            match rest.strip_suffix(store.separator.as_str()) {
                Some(dir) => {
                    entries.insert(dir.to_string(), FileType::Directory);
                }
                None => {
                    entries.entry(rest.to_string()).or_insert(FileType::File);
                }
            }
        }
        Ok(entries
            .into_iter()
            .map(|(name, kind)| DirEntry::new(name, kind))
            .collect())
    }

    fn getinfo(&self, path: &str) -> VfsResult<FileInfo> {
        if vpath::is_root(path) {
            return Ok(FileInfo::default());
        }
        match self.store.client.head(&self.store.key(path))? {
            Some(head) => Ok(FileInfo {
                size: Some(head.size),
                modified_time: Some(head.last_modified),
                ..Default::default()
            }),
            None if self.store.isdir(path) => Ok(FileInfo::default()),
            None => Err(VfsError::not_found(path)),
        }
    }

    #[tracing::instrument(skip(self), name = "object_store.makedir")]
    fn makedir(&self, path: &str, recursive: bool, allow_recreate: bool) -> VfsResult<()> {
        let store = &self.store;
        if vpath::is_root(path) {
            return if allow_recreate {
                Ok(())
            } else {
                Err(VfsError::already_exists(path))
            };
        }
        let key = store.key(path);
        let dir_key = store.dir_key(path);
        let parent = vpath::dirname(&canonical(path)).to_string();
        let parent_key = store.dir_key(&parent);

        let names = store.list(&parent_key, true)?.names();
        for name in &names {
            if *name == key {
                return Err(VfsError::wrong_type(
                    path,
                    "destination exists as a regular file",
                ));
            }
            if *name == dir_key {
                return if allow_recreate {
                    Ok(())
                } else {
                    Err(VfsError::already_exists(path))
                };
            }
        }

        let parent_exists = vpath::is_root(&parent) || !names.is_empty();
        if !parent_exists {
            if recursive {
                self.makedir(&parent, true, true)?;
            } else if store.isfile(&parent) {
                return Err(VfsError::wrong_type(path, "parent is a regular file"));
            } else {
                return Err(VfsError::missing_parent(path));
            }
        }

        store.put_synced(&dir_key, &mut io::empty())?;
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "object_store.remove")]
    fn remove(&self, path: &str) -> VfsResult<()> {
        let store = &self.store;
        if vpath::is_root(path) {
            return Err(VfsError::is_a_directory(path));
        }
        let key = store.key(path);
        let names = store.list(&key, true)?.names();

        if !names.contains(&key) {
            if names.contains(&store.dir_key(path)) {
                return Err(VfsError::wrong_type(path, "that's not a file"));
            }
            return Err(VfsError::not_found(path));
        }
        store.delete_synced(&key)
    }

    #[tracing::instrument(skip(self), name = "object_store.removedir")]
    fn removedir(&self, path: &str, recursive: bool, force: bool) -> VfsResult<()> {
        let store = &self.store;
        if vpath::is_root(path) {
            return Err(VfsError::invalid_path("can not remove the root directory"));
        }
        let dir_key = store.dir_key(path);

        // Forced removal needs every key anyway, so skip the delimiter.
        let names = store.list(&dir_key, !force)?.names();
        if names.is_empty() {
            if store.isfile(path) {
                return Err(VfsError::not_a_directory(path));
            }
            return Err(VfsError::directory_not_found(path));
        }
        if !force && names.iter().any(|name| *name != dir_key) {
            return Err(VfsError::not_empty(path));
        }
        for name in names.iter().filter(|name| **name != dir_key) {
            store.client.delete(name)?;
        }
        store.delete_synced(&dir_key)?;

        if recursive {
            let parent = vpath::dirname(&canonical(path)).to_string();
            if !vpath::is_root(&parent) {
                match self.removedir(&parent, true, false) {
                    Ok(()) | Err(VfsError::NotEmpty(_)) => {}
                    // An implicit parent vanishes with its last member.
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "object_store.rename")]
    fn rename(&self, src: &str, dst: &str) -> VfsResult<()> {
        if !vpath::is_same_dir(src, dst) {
            return Err(VfsError::invalid_path(format!(
                "rename target must be in the same directory (use move): {src} -> {dst}"
            )));
        }
        if self.store.isdir(src) {
            self.move_dir(src, dst, false)
        } else {
            self.move_file(src, dst, false)
        }
    }

    /// Upload directly, skipping the staging buffer.
    fn setcontents(&self, path: &str, contents: &mut dyn Read) -> VfsResult<()> {
        if self.store.isdir(path) {
            return Err(VfsError::is_a_directory(path));
        }
        self.require_parent(path)?;
        self.store.upload(path, contents)
    }

    /// Server-side copy. An existing directory destination receives the
    /// source under its own name.
    #[tracing::instrument(skip(self), name = "object_store.copy")]
    fn copy(&self, src: &str, dst: &str, overwrite: bool) -> VfsResult<()> {
        self.copy_object(src, dst, overwrite).map(|_| ())
    }

    /// Copy then delete. Not atomic.
    #[tracing::instrument(skip(self), name = "object_store.move_file")]
    fn move_file(&self, src: &str, dst: &str, overwrite: bool) -> VfsResult<()> {
        let src_key = self.store.key(src);
        if self.copy_object(src, dst, overwrite)? == src_key {
            return Ok(());
        }
        self.store.delete_synced(&src_key)
    }

    /// Copy every key under `src`, then delete the originals. Not atomic.
    #[tracing::instrument(skip(self), name = "object_store.move_dir")]
    fn move_dir(&self, src: &str, dst: &str, overwrite: bool) -> VfsResult<()> {
        let store = &self.store;
        if vpath::is_root(src) || vpath::is_prefix(&canonical(src), &canonical(dst)) {
            return Err(VfsError::invalid_path(format!(
                "can not move {src} into itself: {dst}"
            )));
        }
        if !store.isdir(src) {
            if store.isfile(src) {
                return Err(VfsError::not_a_directory(src));
            }
            return Err(VfsError::directory_not_found(src));
        }
        if store.isfile(dst) {
            return Err(VfsError::wrong_type(dst, "destination is a regular file"));
        }
        if store.isdir(dst) {
            if !overwrite {
                return Err(VfsError::destination_exists(dst));
            }
            self.removedir(dst, false, true)?;
        }
        self.require_parent(dst)?;

        let src_key = store.dir_key(src);
        let dst_key = store.dir_key(dst);
        let members = store.list(&src_key, false)?.objects;
        for object in &members {
            let target = format!("{dst_key}{}", &object.key[src_key.len()..]);
            store.copy_synced(&object.key, &target)?;
        }
        for object in &members {
            store.client.delete(&object.key)?;
        }
        Ok(())
    }
}
