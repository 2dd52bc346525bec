//! In-memory cache with a fixed time-to-live.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Async-safe key/value store whose entries expire `ttl` after insertion.
///
/// Cloning is cheap and clones share the same storage.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    entries: Arc<Mutex<HashMap<K, (V, Instant)>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value if it is younger than the TTL. Expired
    /// entries are dropped on the way out.
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().await;
        if let Some((value, inserted)) = entries.get(key) {
            if inserted.elapsed() < self.ttl {
                debug!("Cache hit for key: {:?}", key);
                return Some(value.clone());
            }
            debug!("Cache expired for key: {:?}", key);
            entries.remove(key);
        }
        debug!("Cache miss for key: {:?}", key);
        None
    }

    pub async fn set(&self, key: K, value: V) {
        debug!("Cached value for key: {:?}", key);
        self.entries.lock().await.insert(key, (value, Instant::now()));
    }

    /// Removes every expired entry and returns how many were dropped.
    pub async fn clear_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, (_, inserted)| inserted.elapsed() < ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_get_before_and_after_expiry() {
        let cache: TtlCache<String, String> = TtlCache::new(Duration::from_secs(10));
        cache.set("a".to_string(), "1".to_string()).await;

        assert_eq!(cache.get(&"a".to_string()).await, Some("1".to_string()));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some("1".to_string()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&"a".to_string()).await, None);
        // the expired entry is gone, not just hidden
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_refreshes_age() {
        let cache: TtlCache<&'static str, u32> = TtlCache::new(Duration::from_secs(10));
        cache.set("k", 1).await;
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("k", 2).await;
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get(&"k").await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_expired_counts_removed() {
        let cache: TtlCache<u64, u64> = TtlCache::new(Duration::from_secs(60));
        cache.set(1, 1).await;
        cache.set(2, 2).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.set(3, 3).await;
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(cache.clear_expired().await, 2);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&3).await, Some(3));
        assert_eq!(cache.clear_expired().await, 0);
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let cache: TtlCache<String, u8> = TtlCache::new(Duration::from_secs(60));
        let other = cache.clone();
        other.set("shared".to_string(), 7).await;

        assert_eq!(cache.get(&"shared".to_string()).await, Some(7));
    }
}
