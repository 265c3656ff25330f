//! In-process `KvStore` for single-node deployments and tests.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::error::{CacheError, CacheResult};
use super::store::KvStore;

struct Slot {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// TTL-aware map with Redis-like semantics for the commands the cache uses.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Slot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired key.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, slot| slot.is_live(now));
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(slot) if slot.is_live(now) => return Ok(Some(slot.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        self.entries.remove_if(key, |_, slot| !slot.is_live(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .insert(key.to_string(), Slot { value, expires_at });
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        let now = Instant::now();
        let mut slot = self.entries.entry(key.to_string()).or_insert_with(|| Slot {
            value: Bytes::from_static(b"0"),
            expires_at: None,
        });
        if !slot.is_live(now) {
            slot.value = Bytes::from_static(b"0");
            slot.expires_at = None;
        }

        let current: i64 = std::str::from_utf8(&slot.value)
            .ok()
            .and_then(|text| text.parse().ok())
            .ok_or_else(|| CacheError::serialization(format!("value at `{key}` is not an integer")))?;
        let next = current
            .checked_add(1)
            .ok_or_else(|| CacheError::serialization(format!("increment at `{key}` overflows")))?;

        slot.value = Bytes::from(next.to_string());
        Ok(next)
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn get_absent_key_is_none() {
        let store = MemoryStore::new();
        assert!(store.get("missing").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn set_get_del() {
        let store = MemoryStore::new();
        store
            .set("k", Bytes::from_static(b"v"), None)
            .await
            .expect("set");
        assert_eq!(
            store.get("k").await.expect("get"),
            Some(Bytes::from_static(b"v"))
        );

        store.del("k").await.expect("del");
        assert!(store.get("k").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let store = MemoryStore::new();
        store
            .set("k", Bytes::from_static(b"v"), Some(Duration::from_millis(10)))
            .await
            .expect("set");

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(store.get("k").await.expect("get").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn incr_starts_from_zero_and_parses_written_counters() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("c").await.expect("incr"), 1);
        assert_eq!(store.incr("c").await.expect("incr"), 2);

        store
            .set("c", Bytes::from_static(b"41"), None)
            .await
            .expect("set");
        assert_eq!(store.incr("c").await.expect("incr"), 42);
    }

    #[tokio::test]
    async fn incr_rejects_non_integer_values() {
        let store = MemoryStore::new();
        store
            .set("c", Bytes::from_static(b"abc"), None)
            .await
            .expect("set");

        let err = store.incr("c").await.expect_err("non-integer");
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    store.incr("c").await.expect("incr");
                }
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }

        assert_eq!(
            store.get("c").await.expect("get"),
            Some(Bytes::from("800"))
        );
    }
}
