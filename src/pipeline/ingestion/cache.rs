use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::constants::DEFAULT_CACHE_TTL_SECS;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// In-process cache whose entries expire after a per-entry TTL.
///
/// Expired entries are dropped lazily on access.
#[derive(Debug)]
pub struct TtlCache<V> {
    default_ttl: Duration,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_CACHE_TTL_SECS))
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.guard();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        debug!("Cache entry {} expired", key);
        entries.remove(key);
        None
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.guard().insert(key.into(), entry);
    }

    pub fn delete(&self, key: &str) -> Option<V> {
        self.guard().remove(key).map(|entry| entry.value)
    }

    pub fn clear(&self) {
        self.guard().clear();
    }

    /// Live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.guard().values().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached value for `key`, or the result of `fetch`, which is cached on success
    pub async fn get_or_set<F, Fut, E>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = fetch().await?;
        self.set(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete_clear() {
        let cache = TtlCache::default();
        cache.set("a", 1);
        cache.set("b", 2);

        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.delete("a"), Some(1));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_entries_expire() {
        let cache = TtlCache::default();
        cache.set_with_ttl("short", "v", Duration::from_millis(10));
        cache.set("long", "w");

        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.get("long"), Some("w"));
    }

    #[tokio::test]
    async fn test_get_or_set_fetches_once() {
        let cache = TtlCache::default();
        let calls = std::sync::atomic::AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<u32, String> = cache
                .get_or_set("k", || async {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(7)
                })
                .await;
            assert_eq!(value.unwrap(), 7);
        }

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_set_does_not_cache_errors() {
        let cache: TtlCache<u32> = TtlCache::default();

        let failed: Result<u32, &str> = cache.get_or_set("k", || async { Err("down") }).await;

        assert!(failed.is_err());
        assert!(cache.get("k").is_none());
    }
}
