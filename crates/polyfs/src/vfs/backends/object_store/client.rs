//! Native object-store client contract.
//!
//! A bucket-scoped key/value store with prefix listing, server-side copy and
//! per-object entity tags. Real deployments plug in an RPC client; tests
//! use [`MemoryObjectStore`](super::MemoryObjectStore).

use std::io::{self, Read};
use std::time::SystemTime;

use thiserror::Error;

use crate::vfs::error::VfsError;

/// Metadata returned by `head`, `put` and `copy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub key: String,
    /// Opaque content fingerprint.
    pub etag: String,
    pub size: u64,
    pub last_modified: SystemTime,
}

/// Result of a prefix listing.
///
/// With a delimiter, keys containing the delimiter after the prefix are
/// rolled up into `common_prefixes` (each ending in the delimiter).
#[derive(Debug, Clone, Default)]
pub struct ObjectListing {
    pub objects: Vec<ObjectHead>,
    pub common_prefixes: Vec<String>,
}

impl ObjectListing {
    /// Object keys and common prefixes, merged in lexicographic order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .objects
            .iter()
            .map(|o| o.key.clone())
            .chain(self.common_prefixes.iter().cloned())
            .collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.common_prefixes.is_empty()
    }
}

/// Object-store client error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no such key: {0}")]
    NoSuchKey(String),

    #[error("object store error: {0}")]
    Service(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<StoreError> for VfsError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NoSuchKey(key) => VfsError::not_found(key),
            StoreError::Service(msg) => VfsError::underlying(msg),
            StoreError::Io(e) => VfsError::Io(e),
        }
    }
}

/// Bucket-scoped object-store operations.
pub trait ObjectStoreClient: Send + Sync {
    /// Fetch object metadata; `None` if the key is absent.
    fn head(&self, key: &str) -> Result<Option<ObjectHead>, StoreError>;

    /// Stream an object's content. Fails with `NoSuchKey` if absent.
    fn get(&self, key: &str) -> Result<Box<dyn Read + Send>, StoreError>;

    /// Create or replace an object.
    fn put(&self, key: &str, body: &mut dyn Read) -> Result<ObjectHead, StoreError>;

    /// Delete an object. Deleting an absent key succeeds.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Server-side copy. Fails with `NoSuchKey` if `src` is absent.
    fn copy(&self, src: &str, dst: &str) -> Result<ObjectHead, StoreError>;

    /// List keys starting with `prefix`, optionally rolled up at `delimiter`.
    fn list(&self, prefix: &str, delimiter: Option<&str>) -> Result<ObjectListing, StoreError>;
}
