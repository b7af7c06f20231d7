//! In-memory key/value maps for one snapshot

use super::path::MapPath;
use crate::error::{Error, Result};
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
struct MapData {
    entries: HashMap<Bytes, Bytes>,
    /// Keyed by range start; value is (exclusive end, value)
    ranges: BTreeMap<u64, (u64, Bytes)>,
}

impl MapData {
    fn get(&self, key: &[u8]) -> Option<Bytes> {
        if let Some(value) = self.entries.get(key) {
            return Some(value.clone());
        }
        if self.ranges.is_empty() {
            return None;
        }
        let n = parse_numeric_key(key)?;
        self.ranges
            .range(..=n)
            .next_back()
            .filter(|(_, (to, _))| n < *to)
            .map(|(_, (_, value))| value.clone())
    }

    fn len(&self) -> usize {
        self.entries.len() + self.ranges.len()
    }
}

fn parse_numeric_key(key: &[u8]) -> Option<u64> {
    std::str::from_utf8(key).ok()?.trim().parse().ok()
}

/// Named maps of one loaded snapshot.
///
/// A map holds exact entries and numeric range entries. Exact entries win; a
/// key that misses them and reads as a decimal `u64` is tried against the
/// ranges.
#[derive(Debug, Clone, Default)]
pub struct KeyValueStore {
    maps: HashMap<String, MapData>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, map: &str, key: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.maps
            .entry(map.to_string())
            .or_default()
            .entries
            .insert(key.into(), value.into());
    }

    /// Add a value for every numeric key in `[from, to)`. Ranges in one map
    /// may not overlap.
    pub fn put_range(&mut self, map: &str, from: u64, to: u64, value: impl Into<Bytes>) -> Result<()> {
        if from >= to {
            return Err(Error::InvalidArgument(format!(
                "Empty range [{}, {}) in map '{}'",
                from, to, map
            )));
        }
        let data = self.maps.entry(map.to_string()).or_default();
        let overlaps_before = data
            .ranges
            .range(..=from)
            .next_back()
            .is_some_and(|(_, (end, _))| *end > from);
        let overlaps_after = data.ranges.range(from..to).next().is_some();
        if overlaps_before || overlaps_after {
            return Err(Error::InvalidArgument(format!(
                "Range [{}, {}) overlaps an existing range in map '{}'",
                from, to, map
            )));
        }
        data.ranges.insert(from, (to, value.into()));
        Ok(())
    }

    /// Value for `key` in a single map
    pub fn get(&self, map: &str, key: &[u8]) -> Option<Bytes> {
        self.maps.get(map)?.get(key)
    }

    /// Follow `path` from `key`. A miss at any step ends the chain.
    pub fn get_path(&self, path: &MapPath, key: &[u8]) -> Option<Bytes> {
        let (first, rest) = path.segments().split_first()?;
        let mut current = self.get(first, key)?;
        for map in rest {
            current = self.get(map, &current)?;
        }
        Some(current)
    }

    pub fn contains_map(&self, map: &str) -> bool {
        self.maps.contains_key(map)
    }

    pub fn map_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.maps.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Entries plus ranges across every map
    pub fn entry_count(&self) -> usize {
        self.maps.values().map(MapData::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }
}
