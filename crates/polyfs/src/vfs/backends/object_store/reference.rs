//! In-process object store.
//!
//! Strongly consistent for `get` and `list`, but `head` can be configured
//! to lag: after every mutation of a key, the next N `head` calls for that
//! key report what was there before. This reproduces the read-after-write
//! window of eventually consistent services closely enough to exercise the
//! reconciliation loop.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{Cursor, Read};
use std::time::SystemTime;

use parking_lot::Mutex;

use super::client::{ObjectHead, ObjectListing, ObjectStoreClient, StoreError};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    head: ObjectHead,
}

#[derive(Debug, Default)]
struct StoreState {
    objects: BTreeMap<String, StoredObject>,
    /// Per-key lagging view: what `head` reports and for how many more calls.
    lagging: HashMap<String, (Option<ObjectHead>, u32)>,
    head_calls: u64,
    put_calls: u64,
    delete_calls: u64,
    copy_calls: u64,
}

impl StoreState {
    fn current_head(&self, key: &str) -> Option<ObjectHead> {
        self.objects.get(key).map(|o| o.head.clone())
    }

    fn start_lag(&mut self, key: &str, previous: Option<ObjectHead>, reads: u32) {
        if reads > 0 {
            self.lagging.insert(key.to_string(), (previous, reads));
        } else {
            self.lagging.remove(key);
        }
    }

    fn store(&mut self, key: &str, data: Vec<u8>, reads: u32) -> ObjectHead {
        let head = ObjectHead {
            key: key.to_string(),
            etag: hex::encode(blake3::hash(&data).as_bytes()),
            size: data.len() as u64,
            last_modified: SystemTime::now(),
        };
        let previous = self.current_head(key);
        self.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                head: head.clone(),
            },
        );
        self.start_lag(key, previous, reads);
        head
    }
}

/// A single-bucket object store held in memory.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    state: Mutex<StoreState>,
    stale_reads: u32,
}

impl MemoryObjectStore {
    /// Create an empty, immediately consistent store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `head` lag `reads` calls behind every mutation.
    pub fn with_stale_reads(mut self, reads: u32) -> Self {
        self.stale_reads = reads;
        self
    }

    /// Number of `head` calls served so far.
    pub fn head_calls(&self) -> u64 {
        self.state.lock().head_calls
    }

    /// Number of `put` calls served so far.
    pub fn put_calls(&self) -> u64 {
        self.state.lock().put_calls
    }

    /// Number of `delete` calls served so far.
    pub fn delete_calls(&self) -> u64 {
        self.state.lock().delete_calls
    }

    /// Number of `copy` calls served so far.
    pub fn copy_calls(&self) -> u64 {
        self.state.lock().copy_calls
    }

    /// Every key currently stored, in order.
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().objects.keys().cloned().collect()
    }
}

impl ObjectStoreClient for MemoryObjectStore {
    fn head(&self, key: &str) -> Result<Option<ObjectHead>, StoreError> {
        let mut state = self.state.lock();
        state.head_calls += 1;

        if let Some((view, remaining)) = state.lagging.get_mut(key) {
            let view = view.clone();
            *remaining -= 1;
            if *remaining == 0 {
                state.lagging.remove(key);
            }
            return Ok(view);
        }
        Ok(state.current_head(key))
    }

    fn get(&self, key: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        let state = self.state.lock();
        let object = state
            .objects
            .get(key)
            .ok_or_else(|| StoreError::NoSuchKey(key.to_string()))?;
        Ok(Box::new(Cursor::new(object.data.clone())))
    }

    fn put(&self, key: &str, body: &mut dyn Read) -> Result<ObjectHead, StoreError> {
        let mut data = Vec::new();
        body.read_to_end(&mut data)?;

        let mut state = self.state.lock();
        state.put_calls += 1;
        Ok(state.store(key, data, self.stale_reads))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.delete_calls += 1;
        if let Some(removed) = state.objects.remove(key) {
            state.start_lag(key, Some(removed.head), self.stale_reads);
        }
        Ok(())
    }

    fn copy(&self, src: &str, dst: &str) -> Result<ObjectHead, StoreError> {
        let mut state = self.state.lock();
        state.copy_calls += 1;
        let data = state
            .objects
            .get(src)
            .map(|o| o.data.clone())
            .ok_or_else(|| StoreError::NoSuchKey(src.to_string()))?;
        Ok(state.store(dst, data, self.stale_reads))
    }

    fn list(&self, prefix: &str, delimiter: Option<&str>) -> Result<ObjectListing, StoreError> {
        let state = self.state.lock();
        let mut listing = ObjectListing::default();
        let mut rolled = BTreeSet::new();

        let matching = state
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix));
        for (key, object) in matching {
            let rest = &key[prefix.len()..];
            match delimiter.and_then(|d| rest.find(d).map(|idx| idx + d.len())) {
                Some(end) => {
                    rolled.insert(format!("{prefix}{}", &rest[..end]));
                }
                None => listing.objects.push(object.head.clone()),
            }
        }
        listing.common_prefixes = rolled.into_iter().collect();
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(store: &MemoryObjectStore, key: &str, body: &[u8]) -> ObjectHead {
        store.put(key, &mut &body[..]).unwrap()
    }

    #[test]
    fn test_etag_tracks_content() {
        let store = MemoryObjectStore::new();
        let a = put(&store, "a", b"same");
        let b = put(&store, "b", b"same");
        let c = put(&store, "c", b"different");
        assert_eq!(a.etag, b.etag);
        assert_ne!(a.etag, c.etag);
        assert_eq!(c.size, 9);
    }

    #[test]
    fn test_list_with_delimiter() {
        let store = MemoryObjectStore::new();
        for key in ["d/", "d/a", "d/b/", "d/b/x", "d/c/y", "dz"] {
            put(&store, key, b"");
        }

        let listing = store.list("d/", Some("/")).unwrap();
        assert_eq!(listing.names(), vec!["d/", "d/a", "d/b/", "d/c/"]);

        let listing = store.list("d", Some("/")).unwrap();
        assert_eq!(listing.names(), vec!["d/", "dz"]);

        let flat = store.list("d/", None).unwrap();
        assert_eq!(flat.objects.len(), 5);
        assert!(flat.common_prefixes.is_empty());
    }

    #[test]
    fn test_stale_heads_after_put() {
        let store = MemoryObjectStore::new().with_stale_reads(2);
        let head = put(&store, "k", b"v1");
        assert_eq!(store.head("k").unwrap(), None);
        assert_eq!(store.head("k").unwrap(), None);
        assert_eq!(store.head("k").unwrap(), Some(head));
        assert_eq!(store.head_calls(), 3);
    }

    #[test]
    fn test_copy_and_missing() {
        let store = MemoryObjectStore::new();
        put(&store, "src", b"body");
        let head = store.copy("src", "dst").unwrap();
        assert_eq!(head.size, 4);

        let mut body = String::new();
        store.get("dst").unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "body");

        assert!(matches!(
            store.copy("missing", "x"),
            Err(StoreError::NoSuchKey(_))
        ));
        assert!(store.get("missing").is_err());
        store.delete("missing").unwrap();
    }
}
