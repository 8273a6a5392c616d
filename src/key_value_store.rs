//! Concurrent key/value store with optional per-key expiry.
//!
//! A readers/writer lock gives unsynchronised concurrent reads and exclusive
//! writes. Each TTL write spawns one deferred deletion task; the task only
//! removes the key while the entry generation is unchanged, so an overwrite
//! is never clobbered by the stale reaper of an earlier write. Lookups also
//! treat an entry past its expiry instant as absent, so a key reads as gone
//! even before its reaper fires.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
    generation: u64,
}

pub struct KeyValueStore {
    entries: RwLock<HashMap<String, Entry>>,
    generation: AtomicU64,
}

impl KeyValueStore {
    pub fn new() -> Self {
        KeyValueStore {
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;

        if let Some(expires_at) = entry.expires_at {
            if Instant::now() >= expires_at {
                return None;
            }
        }

        Some(entry.value.clone())
    }

    pub async fn set(&self, key: String, value: String) {
        let generation = self.next_generation();

        self.entries.write().await.insert(
            key,
            Entry {
                value,
                expires_at: None,
                generation,
            },
        );
    }

    /// Stores the value and schedules its removal after `ttl`.
    pub async fn set_with_ttl(self: Arc<Self>, key: String, value: String, ttl: Duration) {
        let generation = self.next_generation();
        let expires_at = Instant::now() + ttl;

        self.entries.write().await.insert(
            key.clone(),
            Entry {
                value,
                expires_at: Some(expires_at),
                generation,
            },
        );

        let store = Arc::clone(&self);
        tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            store.remove_if_generation(&key, generation).await;
        });
    }

    async fn remove_if_generation(&self, key: &str, generation: u64) {
        let mut entries = self.entries.write().await;

        if entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
        {
            entries.remove(key);
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::KeyValueStore;

    #[tokio::test]
    async fn test_set_and_get_round_trip() {
        let store = KeyValueStore::new();

        store.set("foo".to_string(), "bar".to_string()).await;

        assert_eq!(store.get("foo").await, Some("bar".to_string()));
        assert_eq!(store.get("missing").await, None);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let store = KeyValueStore::new();

        store.set("foo".to_string(), "bar".to_string()).await;
        store.set("foo".to_string(), "baz".to_string()).await;

        assert_eq!(store.get("foo").await, Some("baz".to_string()));
    }

    #[tokio::test]
    async fn test_ttl_expires_key() {
        let store = Arc::new(KeyValueStore::new());

        Arc::clone(&store)
            .set_with_ttl("x".to_string(), "1".to_string(), Duration::from_millis(50))
            .await;

        assert_eq!(store.get("x").await, Some("1".to_string()));

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.get("x").await, None);
    }

    #[tokio::test]
    async fn test_overwrite_survives_stale_reaper() {
        let store = Arc::new(KeyValueStore::new());

        Arc::clone(&store)
            .set_with_ttl("x".to_string(), "old".to_string(), Duration::from_millis(50))
            .await;
        store.set("x".to_string(), "new".to_string()).await;

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.get("x").await, Some("new".to_string()));
    }
}
