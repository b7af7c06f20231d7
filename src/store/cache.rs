//! Load-on-miss LRU cache of snapshot stores

use super::kv::KeyValueStore;
use super::path::MapPath;
use crate::config::StoreCacheConfig;
use crate::effective::VersionId;
use crate::error::Result;
use bytes::Bytes;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds the store for one snapshot version
pub trait Loader: Send + Sync {
    fn load(&self, version: VersionId) -> Result<KeyValueStore>;
}

impl<F> Loader for F
where
    F: Fn(VersionId) -> Result<KeyValueStore> + Send + Sync,
{
    fn load(&self, version: VersionId) -> Result<KeyValueStore> {
        self(version)
    }
}

/// Loaded stores, one per version, evicted least recently used first.
///
/// At most one load runs at a time for a given version; other callers for
/// that version wait and then share its result. A failed load is not cached.
pub struct VersionedStoreCache {
    loader: Arc<dyn Loader>,
    stores: Mutex<LruCache<VersionId, Arc<KeyValueStore>>>,
    loading: DashMap<VersionId, Arc<Mutex<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    evictions: AtomicU64,
}

impl VersionedStoreCache {
    pub fn new(config: &StoreCacheConfig, loader: Arc<dyn Loader>) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.max_stores).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            loader,
            stores: Mutex::new(LruCache::new(capacity)),
            loading: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Value for `key` under `path` in the given version
    pub fn get(&self, version: VersionId, path: &MapPath, key: &[u8]) -> Result<Option<Bytes>> {
        let store = self.store(version)?;
        Ok(store.get_path(path, key))
    }

    /// The loaded store for `version`, loading it if needed
    pub fn store(&self, version: VersionId) -> Result<Arc<KeyValueStore>> {
        if let Some(store) = self.stores.lock().get(&version).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(store);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        loop {
            let lock = Arc::clone(self.loading.entry(version).or_default().value());
            let _loading = lock.lock();

            // Only the registered lock may guard a load; a retired one is retried
            let registered = self
                .loading
                .get(&version)
                .is_some_and(|current| Arc::ptr_eq(current.value(), &lock));
            if !registered {
                continue;
            }

            // Loaded by whoever held the lock before us
            let loaded = self.stores.lock().get(&version).cloned();
            let result = match loaded {
                Some(store) => Ok(store),
                None => self.load(version),
            };
            // Retired while still held so no waiter can load under it
            self.loading.remove(&version);
            return result;
        }
    }

    fn load(&self, version: VersionId) -> Result<Arc<KeyValueStore>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let store = match self.loader.load(version) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                self.load_failures.fetch_add(1, Ordering::Relaxed);
                warn!(version = %version, error = %e, "Failed to load store");
                return Err(e);
            }
        };
        debug!(
            version = %version,
            maps = store.map_names().len(),
            entries = store.entry_count(),
            "Loaded store"
        );

        if let Some((evicted, _)) = self.stores.lock().push(version, Arc::clone(&store)) {
            if evicted != version {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(version = %evicted, "Evicted store");
            }
        }
        Ok(store)
    }

    pub fn contains(&self, version: VersionId) -> bool {
        self.stores.lock().contains(&version)
    }

    /// Drop the loaded store for `version`. Returns whether one was cached.
    pub fn invalidate(&self, version: VersionId) -> bool {
        let removed = self.stores.lock().pop(&version).is_some();
        if removed {
            debug!(version = %version, "Invalidated store");
        }
        removed
    }

    pub fn clear(&self) {
        self.stores.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreCacheStats {
        let stores = self.stores.lock();
        StoreCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: stores.len(),
            capacity: stores.cap().get(),
        }
    }
}

/// Store cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub load_failures: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}
