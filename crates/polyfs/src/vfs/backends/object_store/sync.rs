//! Read-after-write reconciliation for eventually consistent stores.
//!
//! After a mutation, poll fresh metadata reads of the key until they agree
//! with what the mutation returned, or until the configured budget runs
//! out. A timeout is not an error: the caller proceeds with whatever the
//! last read showed.

use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::client::{ObjectHead, ObjectStoreClient, StoreError};

/// Default reconciliation budget.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default pause between metadata polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How hard to wait for a mutation to become visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "KeySyncRepr", into = "KeySyncRepr")]
pub enum KeySync {
    /// Trust the store's native consistency; never poll.
    Disabled,
    /// Poll until visible or until the budget elapses. A zero budget still
    /// performs one metadata read.
    Timeout(Duration),
}

impl Default for KeySync {
    fn default() -> Self {
        KeySync::Timeout(DEFAULT_SYNC_TIMEOUT)
    }
}

impl KeySync {
    /// Bounded reconciliation with a budget in milliseconds.
    pub fn timeout_ms(ms: u64) -> Self {
        KeySync::Timeout(Duration::from_millis(ms))
    }
}

/// Config form: `key_sync = "disabled"` or `key_sync = { timeout_ms = 500 }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum KeySyncRepr {
    Keyword(String),
    Bounded { timeout_ms: u64 },
}

impl TryFrom<KeySyncRepr> for KeySync {
    type Error = String;

    fn try_from(repr: KeySyncRepr) -> Result<Self, Self::Error> {
        match repr {
            KeySyncRepr::Keyword(word) if word == "disabled" => Ok(KeySync::Disabled),
            KeySyncRepr::Keyword(word) => Err(format!(
                "unknown key_sync {word:?} (expected \"disabled\" or {{ timeout_ms = N }})"
            )),
            KeySyncRepr::Bounded { timeout_ms } => Ok(KeySync::timeout_ms(timeout_ms)),
        }
    }
}

impl From<KeySync> for KeySyncRepr {
    fn from(sync: KeySync) -> Self {
        match sync {
            KeySync::Disabled => KeySyncRepr::Keyword("disabled".to_string()),
            KeySync::Timeout(d) => KeySyncRepr::Bounded {
                timeout_ms: d.as_millis() as u64,
            },
        }
    }
}

/// Consecutive absent reads, after the key was seen, that end a wait for
/// an entity tag.
const VANISHED_POLLS: u32 = 2;

/// What ends a poll early, besides the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vanish {
    /// Keep polling whatever `head` reports.
    Ignore,
    /// Stop once the key was seen and then reads absent `VANISHED_POLLS`
    /// times in a row; someone else deleted it.
    GiveUp,
}

/// Poll `head` until `accept` holds or the budget is spent.
///
/// Returns the last head observed (or `fallback` when polling is disabled).
fn poll_until<F>(
    client: &dyn ObjectStoreClient,
    key: &str,
    sync: KeySync,
    interval: Duration,
    fallback: Option<ObjectHead>,
    vanish: Vanish,
    accept: F,
) -> Result<Option<ObjectHead>, StoreError>
where
    F: Fn(Option<&ObjectHead>) -> bool,
{
    let budget = match sync {
        KeySync::Disabled => return Ok(fallback),
        KeySync::Timeout(budget) => budget,
    };

    let started = Instant::now();
    let mut current = client.head(key)?;
    let mut polls = 1u32;
    let mut seen = false;
    let mut absent = 0u32;
    while !accept(current.as_ref()) {
        if vanish == Vanish::GiveUp {
            if current.is_some() {
                seen = true;
                absent = 0;
            } else if seen {
                absent += 1;
                if absent >= VANISHED_POLLS {
                    tracing::warn!(
                        "key {} disappeared while waiting after {} polls; continuing without it",
                        key,
                        polls
                    );
                    return Ok(current);
                }
            }
        }
        if started.elapsed() >= budget {
            tracing::warn!(
                "key {} not consistent after {} polls ({:?}); continuing with stale read",
                key,
                polls,
                budget
            );
            return Ok(current);
        }
        thread::sleep(interval);
        current = client.head(key)?;
        polls += 1;
    }
    tracing::debug!("key {} consistent after {} polls", key, polls);
    Ok(current)
}

/// Wait for `key` to report the entity tag of `written`.
pub fn await_etag(
    client: &dyn ObjectStoreClient,
    written: &ObjectHead,
    sync: KeySync,
    interval: Duration,
) -> Result<ObjectHead, StoreError> {
    let seen = poll_until(
        client,
        &written.key,
        sync,
        interval,
        Some(written.clone()),
        Vanish::GiveUp,
        |head| head.is_some_and(|h| h.etag == written.etag),
    )?;
    Ok(seen.unwrap_or_else(|| written.clone()))
}

/// Wait for `key` to disappear.
pub fn await_absence(
    client: &dyn ObjectStoreClient,
    key: &str,
    sync: KeySync,
    interval: Duration,
) -> Result<(), StoreError> {
    poll_until(client, key, sync, interval, None, Vanish::Ignore, |head| {
        head.is_none()
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::object_store::MemoryObjectStore;

    fn put(store: &MemoryObjectStore, key: &str, body: &[u8]) -> ObjectHead {
        store.put(key, &mut &body[..]).unwrap()
    }

    #[test]
    fn test_disabled_never_polls() {
        let store = MemoryObjectStore::new().with_stale_reads(5);
        let head = put(&store, "k", b"v1");
        let before = store.head_calls();

        let seen = await_etag(&store, &head, KeySync::Disabled, Duration::ZERO).unwrap();
        assert_eq!(seen, head);
        assert_eq!(store.head_calls(), before);
    }

    #[test]
    fn test_polls_through_stale_reads() {
        let store = MemoryObjectStore::new().with_stale_reads(3);
        let head = put(&store, "k", b"v1");

        let seen = await_etag(&store, &head, KeySync::timeout_ms(5_000), Duration::ZERO).unwrap();
        assert_eq!(seen.etag, head.etag);
        assert_eq!(store.head_calls(), 4);
    }

    #[test]
    fn test_zero_budget_reads_once() {
        let store = MemoryObjectStore::new().with_stale_reads(10);
        put(&store, "k", b"v1");
        let head = put(&store, "k", b"v2");

        let seen = await_etag(&store, &head, KeySync::timeout_ms(0), Duration::ZERO).unwrap();
        assert_ne!(seen.etag, head.etag);
        assert_eq!(store.head_calls(), 1);
    }

    #[test]
    fn test_timeout_returns_stale() {
        let store = MemoryObjectStore::new().with_stale_reads(1_000);
        let old = put(&store, "k", b"v1");
        let new = put(&store, "k", b"v2");

        let started = Instant::now();
        let seen = await_etag(
            &store,
            &new,
            KeySync::timeout_ms(30),
            Duration::from_millis(5),
        )
        .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(seen.etag, old.etag);
    }

    #[test]
    fn test_etag_wait_ends_when_key_deleted() {
        let store = MemoryObjectStore::new().with_stale_reads(3);
        let first = put(&store, "k", b"v1");
        put(&store, "k", b"v2");
        store.delete("k").unwrap();
        let before = store.head_calls();

        // v1 never shows again: three lagging reads of v2, then two absent.
        let started = Instant::now();
        let seen = await_etag(&store, &first, KeySync::timeout_ms(5_000), Duration::ZERO).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(store.head_calls() - before, 5);
        assert_eq!(seen, first);
    }

    #[test]
    fn test_etag_wait_tolerates_absence_before_first_sight() {
        let store = MemoryObjectStore::new().with_stale_reads(4);
        let head = put(&store, "fresh", b"v1");

        // Not yet visible is lag, not deletion.
        let seen = await_etag(&store, &head, KeySync::timeout_ms(5_000), Duration::ZERO).unwrap();
        assert_eq!(seen.etag, head.etag);
        assert_eq!(store.head_calls(), 5);
    }

    #[test]
    fn test_await_absence() {
        let store = MemoryObjectStore::new().with_stale_reads(2);
        put(&store, "k", b"v1");
        store.delete("k").unwrap();
        let before = store.head_calls();

        await_absence(&store, "k", KeySync::timeout_ms(5_000), Duration::ZERO).unwrap();
        assert_eq!(store.head_calls() - before, 3);
    }

    #[test]
    fn test_config_forms() {
        #[derive(Deserialize)]
        struct Wrapper {
            key_sync: KeySync,
        }
        let w: Wrapper = toml::from_str("key_sync = \"disabled\"").unwrap();
        assert_eq!(w.key_sync, KeySync::Disabled);

        let w: Wrapper = toml::from_str("key_sync = { timeout_ms = 250 }").unwrap();
        assert_eq!(w.key_sync, KeySync::timeout_ms(250));

        assert!(toml::from_str::<Wrapper>("key_sync = \"sometimes\"").is_err());
    }
}
