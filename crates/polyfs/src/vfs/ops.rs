//! The shared filesystem contract.
//!
//! Every backend implements [`Filesystem`]. Paths are virtual,
//! `/`-separated strings; each backend canonicalizes them (and sandboxes
//! them, where relevant) before issuing native calls.

use std::fmt;
use std::io::{self, Read, Seek, Write};

use polyfs_path::{self as vpath, Wildcard};

use super::error::{VfsError, VfsResult};
use super::types::{DirEntry, FileInfo, FileType, ListOptions, OpenMode};

/// An open file.
///
/// Reads, writes and seeks act on the handle's own buffer. `Write::flush`
/// publishes the buffer to the backend without closing; [`close`] publishes
/// and releases it. A closed handle performs no further I/O: reads return
/// 0 bytes, writes accept 0 bytes, flush and close are no-ops.
///
/// Dropping an open handle closes it, but callers should close explicitly
/// so write-back errors are observed.
///
/// [`close`]: FileHandle::close
pub trait FileHandle: Read + Write + Seek + Send + fmt::Debug {
    /// Close the handle, writing back buffered content if writable.
    ///
    /// Only the first call has any effect.
    fn close(&mut self) -> VfsResult<()>;

    /// Returns true once the handle is closed (explicitly or by orphaning).
    fn is_closed(&self) -> bool;
}

/// Core filesystem contract.
pub trait Filesystem: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Open a file.
    fn open(&self, path: &str, mode: OpenMode) -> VfsResult<Box<dyn FileHandle>>;

    /// Returns true if the path exists and is a directory. Never fails.
    fn isdir(&self, path: &str) -> bool;

    /// Returns true if the path exists and is a regular file. Never fails.
    fn isfile(&self, path: &str) -> bool;

    /// Read directory entries.
    fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>>;

    /// Get resource metadata.
    fn getinfo(&self, path: &str) -> VfsResult<FileInfo>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Create a directory.
    ///
    /// Without `recursive` the parent must exist. An existing directory is
    /// only accepted when `allow_recreate` is set.
    fn makedir(&self, path: &str, recursive: bool, allow_recreate: bool) -> VfsResult<()>;

    /// Remove a file.
    fn remove(&self, path: &str) -> VfsResult<()>;

    /// Remove a directory.
    ///
    /// `force` deletes the contents first; `recursive` then removes each
    /// ancestor that became empty, stopping quietly at the first one that
    /// is not.
    fn removedir(&self, path: &str, recursive: bool, force: bool) -> VfsResult<()>;

    /// Rename within the same directory.
    fn rename(&self, src: &str, dst: &str) -> VfsResult<()>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    fn exists(&self, path: &str) -> bool {
        self.isdir(path) || self.isfile(path)
    }

    /// List a directory by name, filtered and shaped by `options`.
    fn listdir(&self, path: &str, options: &ListOptions) -> VfsResult<Vec<String>> {
        let entries = self.readdir(path)?;
        filter_listing(path, entries, options)
    }

    /// Human-readable description of a resource.
    fn desc(&self, path: &str) -> String {
        let _ = path;
        "No description available".to_string()
    }

    /// Size of a file in bytes.
    fn getsize(&self, path: &str) -> VfsResult<u64> {
        self.getinfo(path)?
            .size
            .ok_or_else(|| VfsError::unsupported(format!("no size available for {path}")))
    }

    /// Read entire file contents.
    fn getcontents(&self, path: &str) -> VfsResult<Vec<u8>> {
        let mut handle = self.open(path, OpenMode::read())?;
        let mut data = Vec::new();
        handle.read_to_end(&mut data)?;
        handle.close()?;
        Ok(data)
    }

    /// Replace a file's contents with everything readable from `contents`.
    fn setcontents(&self, path: &str, contents: &mut dyn Read) -> VfsResult<()> {
        let mut handle = self.open(path, OpenMode::write())?;
        io::copy(contents, &mut handle)?;
        handle.close()
    }

    /// Copy a file, possibly across directories.
    fn copy(&self, src: &str, dst: &str, overwrite: bool) -> VfsResult<()> {
        if !self.isfile(src) {
            if self.isdir(src) {
                return Err(VfsError::wrong_type(src, "source is not a file"));
            }
            return Err(VfsError::not_found(src));
        }
        if same_path(src, dst) {
            return Ok(());
        }
        if !overwrite && self.exists(dst) {
            return Err(VfsError::destination_exists(dst));
        }
        if !self.isdir(vpath::dirname(&vpath::abspath(dst))) {
            return Err(VfsError::missing_parent(dst));
        }

        let mut reader = self.open(src, OpenMode::read())?;
        let mut writer = self.open(dst, OpenMode::write())?;
        io::copy(&mut reader, &mut writer)?;
        reader.close()?;
        writer.close()
    }

    /// Move a file, possibly across directories.
    ///
    /// Copy-then-remove: not atomic. A failure between the two steps
    /// leaves both source and destination in place.
    fn move_file(&self, src: &str, dst: &str, overwrite: bool) -> VfsResult<()> {
        self.copy(src, dst, overwrite)?;
        if same_path(src, dst) {
            return Ok(());
        }
        self.remove(src)
    }

    /// Move a directory, possibly across directories.
    fn move_dir(&self, src: &str, dst: &str, overwrite: bool) -> VfsResult<()> {
        let _ = (dst, overwrite);
        Err(VfsError::unsupported(format!("move_dir of {src}")))
    }
}

fn same_path(a: &str, b: &str) -> bool {
    vpath::normpath(&vpath::abspath(a)) == vpath::normpath(&vpath::abspath(b))
}

/// Shape raw directory entries according to [`ListOptions`].
///
/// Directories come first, then files, each sorted by name. The wildcard
/// is applied to bare names before any path joining.
pub fn filter_listing(
    path: &str,
    entries: Vec<DirEntry>,
    options: &ListOptions,
) -> VfsResult<Vec<String>> {
    if options.dirs_only && options.files_only {
        return Err(VfsError::invalid_path(
            "dirs_only and files_only can not both be set",
        ));
    }

    let wildcard = options
        .wildcard
        .as_deref()
        .map(Wildcard::new)
        .transpose()
        .map_err(|e| VfsError::invalid_path(e.to_string()))?;

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in entries {
        if wildcard.as_ref().is_some_and(|w| !w.matches(&entry.name)) {
            continue;
        }
        match entry.kind {
            FileType::Directory => dirs.push(entry.name),
            FileType::File => files.push(entry.name),
        }
    }
    dirs.sort();
    files.sort();

    let names: Vec<String> = if options.dirs_only {
        dirs
    } else if options.files_only {
        files
    } else {
        dirs.into_iter().chain(files).collect()
    };

    Ok(names
        .into_iter()
        .map(|name| {
            if options.absolute {
                vpath::abspath(&vpath::join(path, &name))
            } else if options.full {
                vpath::join(path, &name)
            } else {
                name
            }
        })
        .collect())
}
