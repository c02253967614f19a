//! Keyed storage for plans, journals and backups
//!
//! [`Store`] is the small put/get/list/delete seam that lets a persistent
//! backend replace the in-memory maps without touching engine logic.
//! [`MemoryStore`] is backed by a moka cache so entries can expire after a
//! configurable time-to-live.

use async_trait::async_trait;
use moka::future::Cache;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

/// Keyed storage interface
#[async_trait]
pub trait Store<K, V>: Send + Sync + Debug
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Insert or replace the value for `key`
    async fn put(&self, key: K, value: V);

    /// Fetch a copy of the value for `key`
    async fn get(&self, key: &K) -> Option<V>;

    /// All live values (unordered)
    async fn list(&self) -> Vec<V>;

    /// Remove and return the value for `key`
    async fn delete(&self, key: &K) -> Option<V>;
}

/// In-memory store with optional time-to-live
#[derive(Debug, Clone)]
pub struct MemoryStore<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Cache<K, V>,
}

impl<K, V> MemoryStore<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a store bounded by `max_capacity` entries, without expiry
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Create a store whose entries expire `ttl` after insertion
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Approximate number of live entries
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Flush pending expirations and evictions
    pub async fn sync(&self) {
        self.inner.run_pending_tasks().await;
    }
}

#[async_trait]
impl<K, V> Store<K, V> for MemoryStore<K, V>
where
    K: Hash + Eq + Debug + Send + Sync + 'static,
    V: Clone + Debug + Send + Sync + 'static,
{
    async fn put(&self, key: K, value: V) {
        self.inner.insert(key, value).await;
    }

    async fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).await
    }

    async fn list(&self) -> Vec<V> {
        self.inner.iter().map(|(_, v)| v).collect()
    }

    async fn delete(&self, key: &K) -> Option<V> {
        self.inner.remove(key).await
    }
}
