//! Backend configuration.
//!
//! Loaded from TOML. The native clients themselves (object-store client,
//! SSH connector) are supplied by the caller; configuration only carries
//! the addressing and tuning knobs.
//!
//! ```toml
//! [backend]
//! kind = "object_store"
//! bucket = "assets"
//! prefix = "site/v2"
//! key_sync = { timeout_ms = 500 }
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vfs::backends::object_store::{KeySync, DEFAULT_POLL_INTERVAL};
use crate::vfs::buffer::DEFAULT_SPOOL_THRESHOLD;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level filesystem configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsConfig {
    pub backend: BackendConfig,
}

impl FsConfig {
    /// Parse from a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Which backend to build, with its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Memory,
    ObjectStore(ObjectStoreConfig),
    Sftp(SftpConfig),
}

/// Flat object-store backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub bucket: String,

    /// Key prefix every path lives under. Empty means the bucket root.
    #[serde(default)]
    pub prefix: String,

    #[serde(default = "default_separator")]
    pub separator: String,

    /// Read-after-write reconciliation: `"disabled"` or `{ timeout_ms = N }`.
    #[serde(default)]
    pub key_sync: KeySync,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Bytes kept in memory per open handle before spilling to disk.
    #[serde(default = "default_spool_threshold")]
    pub spool_threshold: usize,
}

impl ObjectStoreConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: String::new(),
            separator: default_separator(),
            key_sync: KeySync::default(),
            poll_interval_ms: default_poll_interval_ms(),
            spool_threshold: default_spool_threshold(),
        }
    }
}

/// SFTP backend settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SftpConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Remote directory all paths are confined to.
    #[serde(default = "default_root")]
    pub root: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default = "default_spool_threshold")]
    pub spool_threshold: usize,
}

impl fmt::Debug for SftpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("root", &self.root)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("spool_threshold", &self.spool_threshold)
            .finish()
    }
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            root: default_root(),
            username: None,
            password: None,
            spool_threshold: default_spool_threshold(),
        }
    }
}

fn default_separator() -> String {
    "/".to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_spool_threshold() -> usize {
    DEFAULT_SPOOL_THRESHOLD
}

fn default_port() -> u16 {
    22
}

fn default_root() -> String {
    "/".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_memory_backend() {
        let config = FsConfig::from_toml_str("[backend]\nkind = \"memory\"\n").unwrap();
        assert_eq!(config.backend, BackendConfig::Memory);
    }

    #[test]
    fn test_object_store_defaults() {
        let config = FsConfig::from_toml_str(
            r#"
            [backend]
            kind = "object_store"
            bucket = "assets"
            "#,
        )
        .unwrap();
        let BackendConfig::ObjectStore(store) = config.backend else {
            panic!("expected object store config");
        };
        assert_eq!(store, ObjectStoreConfig::new("assets"));
        assert_eq!(store.separator, "/");
        assert_eq!(store.poll_interval_ms, 100);
        assert_eq!(store.key_sync, KeySync::Timeout(Duration::from_millis(1000)));
    }

    #[test]
    fn test_object_store_full() {
        let config = FsConfig::from_toml_str(
            r#"
            [backend]
            kind = "object_store"
            bucket = "assets"
            prefix = "site/v2"
            separator = "|"
            key_sync = "disabled"
            poll_interval_ms = 20
            spool_threshold = 4096
            "#,
        )
        .unwrap();
        let BackendConfig::ObjectStore(store) = config.backend else {
            panic!("expected object store config");
        };
        assert_eq!(store.prefix, "site/v2");
        assert_eq!(store.separator, "|");
        assert_eq!(store.key_sync, KeySync::Disabled);
        assert_eq!(store.poll_interval_ms, 20);
        assert_eq!(store.spool_threshold, 4096);
    }

    #[test]
    fn test_sftp_defaults() {
        let config = FsConfig::from_toml_str(
            r#"
            [backend]
            kind = "sftp"
            host = "files.example"
            username = "deploy"
            "#,
        )
        .unwrap();
        let BackendConfig::Sftp(sftp) = config.backend else {
            panic!("expected sftp config");
        };
        assert_eq!(sftp.port, 22);
        assert_eq!(sftp.root, "/");
        assert_eq!(sftp.username.as_deref(), Some("deploy"));
        assert_eq!(sftp.password, None);
    }

    #[test]
    fn test_sftp_debug_redacts_password() {
        let config = FsConfig::from_toml_str(
            r#"
            [backend]
            kind = "sftp"
            host = "files.example"
            username = "deploy"
            password = "hunter2"
            "#,
        )
        .unwrap();
        let shown = format!("{config:?}");
        assert!(shown.contains("deploy"));
        assert!(shown.contains("<redacted>"));
        assert!(!shown.contains("hunter2"));

        let BackendConfig::Sftp(sftp) = config.backend else {
            panic!("expected sftp config");
        };
        assert_eq!(sftp.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_rejects_unknown_kind() {
        let err = FsConfig::from_toml_str("[backend]\nkind = \"ftp\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            b"[backend]\nkind = \"sftp\"\nhost = \"h\"\nroot = \"/srv\"\n",
        )
        .unwrap();
        let config = FsConfig::load(file.path()).unwrap();
        let BackendConfig::Sftp(sftp) = config.backend else {
            panic!("expected sftp config");
        };
        assert_eq!(sftp.root, "/srv");

        assert!(matches!(
            FsConfig::load("/nonexistent/polyfs.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
