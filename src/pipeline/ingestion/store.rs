use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::cache::TtlCache;
use super::rate_limiter::RateLimiter;
use crate::domain::Contact;
use crate::error::{PipelineError, Result};
use crate::metrics;

/// Paged source of contacts
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Up to `limit` contacts starting at `offset`, in store order
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<Contact>>;

    async fn count(&self) -> Result<usize>;
}

/// Read every contact from `store`, `page_size` at a time
pub async fn fetch_all(store: &dyn ContactStore, page_size: usize) -> Result<Vec<Contact>> {
    if page_size == 0 {
        return Err(PipelineError::InvalidConfiguration(
            "page_size must be greater than 0".to_string(),
        ));
    }

    let mut contacts = Vec::new();
    loop {
        let page = store.fetch_page(contacts.len(), page_size).await?;
        let last_page = page.len() < page_size;
        debug!("Fetched page of {} contacts at offset {}", page.len(), contacts.len());
        contacts.extend(page);
        if last_page {
            break;
        }
    }
    Ok(contacts)
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryContactStore {
    contacts: Vec<Contact>,
}

impl InMemoryContactStore {
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self { contacts }
    }
}

#[async_trait]
impl ContactStore for InMemoryContactStore {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<Contact>> {
        Ok(self.contacts.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.contacts.len())
    }
}

/// Store backed by a JSON array of contacts, read once on first access
#[derive(Debug)]
pub struct JsonFileContactStore {
    path: PathBuf,
    contacts: OnceCell<Vec<Contact>>,
}

impl JsonFileContactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            contacts: OnceCell::new(),
        }
    }

    async fn contacts(&self) -> Result<&Vec<Contact>> {
        self.contacts
            .get_or_try_init(|| async {
                let raw = tokio::fs::read_to_string(&self.path)
                    .await
                    .map_err(|e| PipelineError::Store {
                        message: format!("failed to read {}: {}", self.path.display(), e),
                    })?;
                let contacts: Vec<Contact> = serde_json::from_str(&raw)?;
                info!("Loaded {} contacts from {}", contacts.len(), self.path.display());
                Ok::<_, PipelineError>(contacts)
            })
            .await
    }
}

#[async_trait]
impl ContactStore for JsonFileContactStore {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<Contact>> {
        Ok(self
            .contacts()
            .await?
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.contacts().await?.len())
    }
}

/// Wraps a store with a TTL page cache and an optional rate limit on misses
pub struct CachedContactStore<S> {
    inner: S,
    pages: TtlCache<Vec<Contact>>,
    counts: TtlCache<usize>,
    limiter: Option<RateLimiter>,
}

impl<S: ContactStore> CachedContactStore<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            pages: TtlCache::new(ttl),
            counts: TtlCache::new(ttl),
            limiter: None,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Drop every cached page and count
    pub fn invalidate(&self) {
        self.pages.clear();
        self.counts.clear();
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
    }
}

#[async_trait]
impl<S: ContactStore> ContactStore for CachedContactStore<S> {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<Contact>> {
        let key = format!("page:{}:{}", offset, limit);
        if let Some(page) = self.pages.get(&key) {
            metrics::store::cache_hit();
            return Ok(page);
        }
        metrics::store::cache_miss();

        self.throttle().await;
        let page = self.inner.fetch_page(offset, limit).await?;
        metrics::store::page_fetched();
        self.pages.set(key, page.clone());
        Ok(page)
    }

    async fn count(&self) -> Result<usize> {
        self.counts
            .get_or_set("count", || async {
                self.throttle().await;
                self.inner.count().await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn contacts(n: usize) -> Vec<Contact> {
        (0..n)
            .map(|i| Contact {
                id: format!("c{}", i),
                ..Default::default()
            })
            .collect()
    }

    struct CountingStore {
        inner: InMemoryContactStore,
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ContactStore for CountingStore {
        async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<Contact>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_page(offset, limit).await
        }

        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }
    }

    #[tokio::test]
    async fn test_fetch_all_walks_every_page() {
        let store = InMemoryContactStore::new(contacts(7));

        let all = fetch_all(&store, 3).await.unwrap();

        let ids: Vec<_> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c0", "c1", "c2", "c3", "c4", "c5", "c6"]);
    }

    #[tokio::test]
    async fn test_fetch_all_rejects_zero_page_size() {
        let store = InMemoryContactStore::new(contacts(1));
        assert!(matches!(
            fetch_all(&store, 0).await,
            Err(PipelineError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_cached_store_serves_repeat_pages_from_cache() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let store = CachedContactStore::new(
            CountingStore {
                inner: InMemoryContactStore::new(contacts(5)),
                fetches: fetches.clone(),
            },
            Duration::from_secs(60),
        );

        store.fetch_page(0, 2).await.unwrap();
        store.fetch_page(0, 2).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        store.invalidate();
        store.fetch_page(0, 2).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert_eq!(store.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_missing_json_file_is_a_store_error() {
        let store = JsonFileContactStore::new("/nonexistent/contacts.json");
        assert!(matches!(store.count().await, Err(PipelineError::Store { .. })));
    }
}
