//! Reference data lookups across prioritised sources

use crate::bytebuffer::{ByteBufferPool, PooledBuffer, PooledBufferPair};
use crate::config::RefDataConfig;
use crate::effective::{EffectiveVersion, EffectiveVersionCache, SourceIdentity, VersionEnumerator};
use crate::error::Result;
use crate::store::{Loader, MapPath, VersionedStoreCache};
use crate::timecodec::TimeCodec;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// What a lookup consulted on its way to a result
#[derive(Debug, Clone, Default)]
pub struct LookupTrace {
    pub map_path: String,
    /// Effective versions tried, in source priority order
    pub consulted: Vec<EffectiveVersion>,
    /// How many of the consulted versions hold the first map of the path
    pub maps_found: usize,
    /// Version that produced the value
    pub hit: Option<EffectiveVersion>,
    pub value: Option<Bytes>,
}

impl LookupTrace {
    pub fn is_hit(&self) -> bool {
        self.value.is_some()
    }
}

impl fmt::Display for LookupTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Map '{}' found in {} of {} effective streams",
            self.map_path,
            self.maps_found,
            self.consulted.len()
        )?;
        if let Some(hit) = &self.hit {
            write!(f, ", value from {}", hit)?;
        }
        Ok(())
    }
}

/// Entry point for enrichment lookups.
///
/// Each source is resolved to the version in effect at the lookup instant and
/// that version's store is searched; the first source with a value wins.
pub struct RefDataLookup {
    versions: EffectiveVersionCache,
    stores: VersionedStoreCache,
    pool: ByteBufferPool,
}

impl RefDataLookup {
    pub fn new(
        config: &RefDataConfig,
        enumerator: Arc<dyn VersionEnumerator>,
        loader: Arc<dyn Loader>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            versions: EffectiveVersionCache::new(config.effective_version_cache.clone(), enumerator),
            stores: VersionedStoreCache::new(&config.store_cache, loader)?,
            pool: ByteBufferPool::new(config.byte_buffer_pool.clone())?,
        })
    }

    pub fn from_parts(
        versions: EffectiveVersionCache,
        stores: VersionedStoreCache,
        pool: ByteBufferPool,
    ) -> Self {
        Self {
            versions,
            stores,
            pool,
        }
    }

    /// First value for `key` under `map_path` across `sources`, in order
    pub fn lookup(
        &self,
        sources: &[SourceIdentity],
        instant: DateTime<Utc>,
        map_path: &str,
        key: &[u8],
    ) -> Result<Option<Bytes>> {
        Ok(self.lookup_with_trace(sources, instant, map_path, key)?.value)
    }

    pub fn lookup_with_trace(
        &self,
        sources: &[SourceIdentity],
        instant: DateTime<Utc>,
        map_path: &str,
        key: &[u8],
    ) -> Result<LookupTrace> {
        let path = MapPath::parse(map_path)?;
        let time_ms = instant.timestamp_millis();
        let mut trace = LookupTrace {
            map_path: path.to_string(),
            ..LookupTrace::default()
        };

        for source in sources {
            let effective = match self.versions.resolve_effective(source, time_ms)? {
                Some(effective) => effective,
                None => {
                    trace!(source = %source, time_ms, "No effective version");
                    continue;
                }
            };
            trace.consulted.push(effective.clone());

            let store = self.stores.store(effective.version)?;
            if !store.contains_map(path.first()) {
                continue;
            }
            trace.maps_found += 1;

            if let Some(value) = store.get_path(&path, key) {
                trace.hit = Some(effective);
                trace.value = Some(value);
                break;
            }
        }

        debug!(
            map_path = %trace.map_path,
            consulted = trace.consulted.len(),
            maps_found = trace.maps_found,
            hit = trace.is_hit(),
            "Lookup complete"
        );
        Ok(trace)
    }

    /// Look up a key made of `prefix` followed by `key_time` encoded with
    /// `codec`. The key is built in a pooled scratch buffer.
    pub fn lookup_temporal(
        &self,
        sources: &[SourceIdentity],
        instant: DateTime<Utc>,
        map_path: &str,
        prefix: &[u8],
        codec: &dyn TimeCodec,
        key_time: DateTime<Utc>,
    ) -> Result<Option<Bytes>> {
        self.pool
            .with_buffer(prefix.len() + codec.encoded_size(), |buffer| {
                codec.write_key(buffer, prefix, key_time)?;
                buffer.flip();
                self.lookup(sources, instant, map_path, buffer.as_slice())
            })
    }

    /// Scratch buffers for building composite keys, one per requested size
    pub fn acquire_scratch_buffers(&self, sizes: &[usize]) -> Result<Vec<PooledBuffer>> {
        self.pool.acquire_many(sizes)
    }

    pub fn acquire_scratch_pair(&self, key_size: usize, value_size: usize) -> Result<PooledBufferPair> {
        self.pool.acquire_pair(key_size, value_size)
    }

    pub fn version_cache(&self) -> &EffectiveVersionCache {
        &self.versions
    }

    pub fn store_cache(&self) -> &VersionedStoreCache {
        &self.stores
    }

    pub fn pool(&self) -> &ByteBufferPool {
        &self.pool
    }
}
