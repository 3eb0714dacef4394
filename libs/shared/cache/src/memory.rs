use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{CacheError, JsonCache, SetMode};

struct Entry {
    raw: String,
    expires_at: Instant,
}

/// In-process cache with TTL expiry and create-only writes.
///
/// Keeps payloads as JSON text, so a payload planted with `insert_raw`
/// surfaces as `CacheError::Corrupt` exactly like it would from Redis.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    reads: AtomicU64,
    writes: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw text without validation.
    pub async fn insert_raw(&self, key: &str, raw: &str, ttl: Duration) {
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                raw: raw.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// While set, every operation fails with `CacheError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of read operations served, counting `mget_json` once.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of write operations attempted, including rejected create-only writes.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.entries
            .read()
            .await
            .get(key)
            .is_some_and(|entry| entry.expires_at > Instant::now())
    }

    fn check_available(&self, operation: &'static str, key: &str) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable {
                operation,
                key: key.to_string(),
                reason: "memory cache marked unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn lookup(entries: &HashMap<String, Entry>, key: &str) -> Result<Option<Value>, CacheError> {
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => serde_json::from_str(&entry.raw)
                .map(Some)
                .map_err(|source| CacheError::Corrupt {
                    key: key.to_string(),
                    source,
                }),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl JsonCache for MemoryCache {
    async fn get_json(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_available("GET", key)?;

        let entries = self.entries.read().await;
        Self::lookup(&entries, key)
    }

    async fn mget_json(&self, keys: &[String]) -> Result<Vec<Option<Value>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_available("MGET", &keys[0])?;

        let entries = self.entries.read().await;
        keys.iter().map(|key| Self::lookup(&entries, key)).collect()
    }

    async fn set_json(
        &self,
        key: &str,
        value: &Value,
        ttl: Duration,
        mode: SetMode,
    ) -> Result<bool, CacheError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check_available("SET", key)?;

        let mut entries = self.entries.write().await;
        let now = Instant::now();
        if mode == SetMode::CreateOnly
            && entries.get(key).is_some_and(|entry| entry.expires_at > now)
        {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                raw: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn round_trips_values() {
        let cache = MemoryCache::new();
        let value = json!({"slots": [{"slot_start_time": "10:00 AM", "isbooked": 0}]});

        assert!(cache.set_json("k", &value, TTL, SetMode::Overwrite).await.unwrap());
        assert_eq!(cache.get_json("k").await.unwrap(), Some(value));
        assert_eq!(cache.get_json("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn create_only_keeps_first_writer() {
        let cache = MemoryCache::new();

        assert!(cache.set_json("k", &json!("v1"), TTL, SetMode::CreateOnly).await.unwrap());
        assert!(!cache.set_json("k", &json!("v2"), TTL, SetMode::CreateOnly).await.unwrap());
        assert_eq!(cache.get_json("k").await.unwrap(), Some(json!("v1")));

        assert!(cache.set_json("k", &json!("v3"), TTL, SetMode::Overwrite).await.unwrap());
        assert_eq!(cache.get_json("k").await.unwrap(), Some(json!("v3")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_create_only_writes_have_one_winner() {
        let cache = std::sync::Arc::new(MemoryCache::new());

        let writers: Vec<_> = (0..16)
            .map(|writer| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let won = cache
                        .set_json("k", &json!(writer), TTL, SetMode::CreateOnly)
                        .await
                        .unwrap();
                    (writer, won)
                })
            })
            .collect();

        let mut winners = Vec::new();
        for writer in writers {
            let (id, won) = writer.await.unwrap();
            if won {
                winners.push(id);
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(cache.get_json("k").await.unwrap(), Some(json!(winners[0])));
        assert_eq!(cache.writes(), 16);
    }

    #[tokio::test]
    async fn expired_entries_are_absent_and_writable() {
        let cache = MemoryCache::new();
        cache
            .set_json("k", &json!(1), Duration::from_millis(20), SetMode::CreateOnly)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.get_json("k").await.unwrap(), None);
        assert!(cache.set_json("k", &json!(2), TTL, SetMode::CreateOnly).await.unwrap());
    }

    #[tokio::test]
    async fn mget_is_positionally_aligned() {
        let cache = MemoryCache::new();
        cache.set_json("a", &json!(1), TTL, SetMode::Overwrite).await.unwrap();
        cache.set_json("c", &json!(3), TTL, SetMode::Overwrite).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(
            cache.mget_json(&keys).await.unwrap(),
            vec![Some(json!(1)), None, Some(json!(3))]
        );
        assert!(cache.mget_json(&[]).await.unwrap().is_empty());
        assert_eq!(cache.reads(), 1);
    }

    #[tokio::test]
    async fn corrupt_payload_is_reported() {
        let cache = MemoryCache::new();
        cache.insert_raw("k", "{not json", TTL).await;

        assert_matches!(cache.get_json("k").await, Err(CacheError::Corrupt { ref key, .. }) if key == "k");
    }

    #[tokio::test]
    async fn unavailable_cache_fails_transiently() {
        let cache = MemoryCache::new();
        cache.set_unavailable(true);

        let err = cache.get_json("k").await.unwrap_err();
        assert!(err.is_transient());
    }
}
