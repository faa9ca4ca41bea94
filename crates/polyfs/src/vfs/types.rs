//! Core VFS types.
//!
//! Shared by every backend: entry kinds, metadata, open modes and listing
//! options.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::SystemTime;

use super::error::VfsError;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// Resource metadata.
///
/// Which fields are present depends on what the backend can report: the
/// in-memory tree knows creation times, object stores only know size and
/// last modification, SFTP reports size plus access/modification times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Size in bytes (files only).
    pub size: Option<u64>,
    /// Creation time.
    pub created_time: Option<SystemTime>,
    /// Last modification time.
    pub modified_time: Option<SystemTime>,
    /// Last access time.
    pub accessed_time: Option<SystemTime>,
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FileType::File)
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Directory)
    }
}

/// Open file mode.
///
/// Parsed from the classic mode strings (`r`, `r+`, `w`, `w+`, `a`, `a+`).
/// A `b` or `t` suffix is accepted and ignored: content is always bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenMode {
    /// Read access requested.
    pub read: bool,
    /// Write access requested.
    pub write: bool,
    /// Writes go to the end of the file.
    pub append: bool,
    /// Discard existing content on open.
    pub truncate: bool,
}

impl OpenMode {
    /// `r`: read an existing file.
    pub fn read() -> Self {
        Self {
            read: true,
            ..Default::default()
        }
    }

    /// `w`: write, creating or truncating.
    pub fn write() -> Self {
        Self {
            write: true,
            truncate: true,
            ..Default::default()
        }
    }

    /// `a`: append to an existing file.
    pub fn append() -> Self {
        Self {
            write: true,
            append: true,
            ..Default::default()
        }
    }

    /// `r+`: read and write an existing file without truncating.
    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    /// Returns true if this mode allows writing.
    pub fn is_writable(&self) -> bool {
        self.write || self.append
    }

    /// Returns true if the file is created/truncated rather than loaded.
    pub fn is_truncating(&self) -> bool {
        self.truncate
    }
}

impl FromStr for OpenMode {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let core: String = s.chars().filter(|c| !matches!(c, 'b' | 't')).collect();
        let mode = match core.as_str() {
            "r" => Self::read(),
            "r+" => Self::read_write(),
            "w" => Self::write(),
            "w+" => Self {
                read: true,
                ..Self::write()
            },
            "a" => Self::append(),
            "a+" => Self {
                read: true,
                ..Self::append()
            },
            _ => return Err(VfsError::invalid_path(format!("invalid open mode: {s:?}"))),
        };
        Ok(mode)
    }
}

/// Options for [`Filesystem::listdir`](super::Filesystem::listdir).
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only names matching this glob.
    pub wildcard: Option<String>,
    /// Join names back onto the listed path.
    pub full: bool,
    /// Join names onto the listed path and make them absolute.
    pub absolute: bool,
    /// Only directories.
    pub dirs_only: bool,
    /// Only files.
    pub files_only: bool,
}

impl ListOptions {
    /// Create default options (bare names, everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter names with a glob.
    pub fn with_wildcard(mut self, wildcard: impl Into<String>) -> Self {
        self.wildcard = Some(wildcard.into());
        self
    }

    /// Return paths joined onto the listed directory.
    pub fn full(mut self) -> Self {
        self.full = true;
        self
    }

    /// Return absolute paths.
    pub fn absolute(mut self) -> Self {
        self.absolute = true;
        self
    }

    /// Only list directories.
    pub fn dirs_only(mut self) -> Self {
        self.dirs_only = true;
        self
    }

    /// Only list files.
    pub fn files_only(mut self) -> Self {
        self.files_only = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type() {
        assert!(FileType::File.is_file());
        assert!(!FileType::File.is_dir());
        assert!(FileType::Directory.is_dir());
    }

    #[test]
    fn test_dir_entry() {
        let file = DirEntry::file("test.txt");
        assert_eq!(file.name, "test.txt");
        assert!(file.kind.is_file());

        let dir = DirEntry::directory("subdir");
        assert!(dir.kind.is_dir());
    }

    #[test]
    fn test_open_mode_parse() {
        assert_eq!("r".parse::<OpenMode>().unwrap(), OpenMode::read());
        assert_eq!("rb".parse::<OpenMode>().unwrap(), OpenMode::read());
        assert_eq!("w".parse::<OpenMode>().unwrap(), OpenMode::write());
        assert_eq!("a".parse::<OpenMode>().unwrap(), OpenMode::append());
        assert_eq!("r+".parse::<OpenMode>().unwrap(), OpenMode::read_write());

        let wplus: OpenMode = "w+b".parse().unwrap();
        assert!(wplus.read && wplus.write && wplus.truncate);

        let aplus: OpenMode = "a+".parse().unwrap();
        assert!(aplus.read && aplus.append && !aplus.truncate);

        for bad in ["x", "rw", "", "+", "ra", "w++"] {
            assert!(
                matches!(bad.parse::<OpenMode>(), Err(VfsError::InvalidPath(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_open_mode_writable() {
        assert!(!OpenMode::read().is_writable());
        assert!(OpenMode::write().is_writable());
        assert!(OpenMode::append().is_writable());
        assert!(OpenMode::read_write().is_writable());
    }

    #[test]
    fn test_file_info_json() {
        let info = FileInfo {
            size: Some(12),
            ..Default::default()
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["size"], 12);
        assert!(json["created_time"].is_null());

        let back: FileInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, info);

        let entry: DirEntry =
            serde_json::from_str(r#"{"name":"docs","kind":"Directory"}"#).unwrap();
        assert_eq!(entry, DirEntry::directory("docs"));
    }

    #[test]
    fn test_list_options_builder() {
        let opts = ListOptions::new().with_wildcard("*.txt").files_only().full();
        assert_eq!(opts.wildcard.as_deref(), Some("*.txt"));
        assert!(opts.files_only);
        assert!(opts.full);
        assert!(!opts.dirs_only);
    }
}
