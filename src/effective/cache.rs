//! Per-source cache of effective versions

use super::version::{EffectiveVersion, SourceIdentity, VersionEnumerator, VersionId};
use crate::config::EffectiveVersionCacheConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Known versions of one source, ordered by effective time
#[derive(Debug)]
struct VersionSet {
    by_time: BTreeMap<i64, VersionId>,
    loaded_at: Instant,
}

impl VersionSet {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() < ttl
    }

    /// Latest version whose effective time is not after `time_ms`
    fn resolve(&self, time_ms: i64) -> Option<(i64, VersionId)> {
        self.by_time
            .range(..=time_ms)
            .next_back()
            .map(|(time, version)| (*time, *version))
    }
}

#[derive(Debug, Default)]
struct SourceEntry {
    versions: RwLock<Option<Arc<VersionSet>>>,
    /// Held while the enumerator is called, so only one caller lists a source
    load_guard: Mutex<()>,
}

impl SourceEntry {
    fn fresh(&self, ttl: Duration) -> Option<Arc<VersionSet>> {
        self.versions
            .read()
            .as_ref()
            .filter(|set| set.is_fresh(ttl))
            .cloned()
    }
}

/// Resolves a source and lookup instant to the snapshot in effect at that
/// instant.
///
/// Version sets are listed lazily, at most once at a time per source, and
/// kept for the configured TTL. Readers of a fresh set only take a shared
/// read lock.
///
/// Entries stay after their TTL so a refresh can merge with what was known.
/// Call [`purge_idle`](Self::purge_idle) periodically when source identities
/// are unbounded.
pub struct EffectiveVersionCache {
    config: EffectiveVersionCacheConfig,
    enumerator: Arc<dyn VersionEnumerator>,
    sources: DashMap<SourceIdentity, Arc<SourceEntry>>,
}

impl EffectiveVersionCache {
    pub fn new(config: EffectiveVersionCacheConfig, enumerator: Arc<dyn VersionEnumerator>) -> Self {
        Self {
            config,
            enumerator,
            sources: DashMap::new(),
        }
    }

    /// Version in effect for `source` at `instant`, if any is old enough
    pub fn resolve(&self, source: &SourceIdentity, instant: DateTime<Utc>) -> Result<Option<VersionId>> {
        self.resolve_ms(source, instant.timestamp_millis())
    }

    pub fn resolve_ms(&self, source: &SourceIdentity, time_ms: i64) -> Result<Option<VersionId>> {
        Ok(self
            .resolve_effective(source, time_ms)?
            .map(|version| version.version))
    }

    /// Like [`resolve_ms`](Self::resolve_ms) but returns the full effective
    /// version
    pub fn resolve_effective(
        &self,
        source: &SourceIdentity,
        time_ms: i64,
    ) -> Result<Option<EffectiveVersion>> {
        let set = self.version_set(source)?;
        let resolved = set
            .resolve(time_ms)
            .map(|(time, version)| EffectiveVersion::new(source.clone(), time, version));
        trace!(source = %source, time_ms, resolved = ?resolved.as_ref().map(|v| v.version), "Resolved effective version");
        Ok(resolved)
    }

    /// Snapshot of the versions known for `source`, oldest first
    pub fn versions(&self, source: &SourceIdentity) -> Result<Vec<EffectiveVersion>> {
        let set = self.version_set(source)?;
        Ok(set
            .by_time
            .iter()
            .map(|(time, version)| EffectiveVersion::new(source.clone(), *time, *version))
            .collect())
    }

    /// Forget the versions of one source; the next resolve lists it again
    pub fn invalidate(&self, source: &SourceIdentity) {
        if self.sources.remove(source).is_some() {
            debug!(source = %source, "Invalidated effective versions");
        }
    }

    pub fn clear(&self) {
        self.sources.clear();
        debug!("Cleared effective version cache");
    }

    /// Drop sources not listed for longer than their TTL plus `idle`,
    /// returning how many were dropped. Sources being listed are kept.
    pub fn purge_idle(&self, idle: Duration) -> usize {
        let before = self.sources.len();
        self.sources.retain(|source, entry| {
            let Some(_listing) = entry.load_guard.try_lock() else {
                return true;
            };
            let keep_for = self.config.ttl_for(source.id()).saturating_add(idle);
            entry
                .versions
                .read()
                .as_ref()
                .is_some_and(|set| set.loaded_at.elapsed() < keep_for)
        });
        let purged = before.saturating_sub(self.sources.len());
        if purged > 0 {
            debug!(purged, remaining = self.sources.len(), "Purged idle sources");
        }
        purged
    }

    /// Number of sources with a cached entry
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    fn entry(&self, source: &SourceIdentity) -> Arc<SourceEntry> {
        if let Some(entry) = self.sources.get(source) {
            return Arc::clone(entry.value());
        }
        Arc::clone(self.sources.entry(source.clone()).or_default().value())
    }

    fn is_current(&self, source: &SourceIdentity, entry: &Arc<SourceEntry>) -> bool {
        self.sources
            .get(source)
            .is_some_and(|current| Arc::ptr_eq(current.value(), entry))
    }

    fn version_set(&self, source: &SourceIdentity) -> Result<Arc<VersionSet>> {
        let ttl = self.config.ttl_for(source.id());
        loop {
            let entry = self.entry(source);
            if let Some(set) = entry.fresh(ttl) {
                return Ok(set);
            }

            let _loading = entry.load_guard.lock();
            // Dropped by invalidate or purge while we waited
            if !self.is_current(source, &entry) {
                continue;
            }
            // Another caller may have listed the source while we waited
            if let Some(set) = entry.fresh(ttl) {
                return Ok(set);
            }
            return self.list(source, &entry);
        }
    }

    fn list(&self, source: &SourceIdentity, entry: &SourceEntry) -> Result<Arc<VersionSet>> {
        let listed = self.enumerator.list_versions(source).map_err(|e| {
            warn!(source = %source, error = %e, "Failed to list versions");
            e
        })?;
        let previous = entry.versions.read().clone();
        let set = Arc::new(merge(source, previous.as_deref(), listed));
        debug!(
            source = %source,
            versions = set.by_time.len(),
            refreshed = previous.is_some(),
            "Loaded effective versions"
        );
        *entry.versions.write() = Some(Arc::clone(&set));
        Ok(set)
    }
}

/// Add newly listed versions to what is already known. Existing entries are
/// kept as they are; within one listing the highest version wins a tie on
/// effective time.
fn merge(
    source: &SourceIdentity,
    previous: Option<&VersionSet>,
    listed: Vec<(i64, VersionId)>,
) -> VersionSet {
    let mut batch: HashMap<i64, VersionId> = HashMap::with_capacity(listed.len());
    for (time, version) in listed {
        match batch.get(&time) {
            Some(existing) if *existing != version => {
                let winner = (*existing).max(version);
                warn!(
                    source = %source,
                    effective_time_ms = time,
                    first = %existing,
                    second = %version,
                    kept = %winner,
                    "Two versions share an effective time"
                );
                batch.insert(time, winner);
            }
            Some(_) => {}
            None => {
                batch.insert(time, version);
            }
        }
    }

    let mut by_time = previous.map(|set| set.by_time.clone()).unwrap_or_default();
    for (time, version) in batch {
        let kept = *by_time.entry(time).or_insert(version);
        if kept != version {
            debug!(
                source = %source,
                effective_time_ms = time,
                kept = %kept,
                ignored = %version,
                "Keeping previously known version"
            );
        }
    }

    VersionSet {
        by_time,
        loaded_at: Instant::now(),
    }
}
