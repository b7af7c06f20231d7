//! Identities and versions of reference data sources

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A reference data feed, e.g. the pipeline that produces a set of maps
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceIdentity {
    id: String,
}

impl SourceIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl From<&str> for SourceIdentity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifies one loaded snapshot of a source. Later snapshots get higher ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionId(pub u64);

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for VersionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A snapshot of a source that applies from `effective_time_ms` onwards
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectiveVersion {
    pub source: SourceIdentity,
    pub effective_time_ms: i64,
    pub version: VersionId,
}

impl EffectiveVersion {
    pub fn new(source: SourceIdentity, effective_time_ms: i64, version: VersionId) -> Self {
        Self {
            source,
            effective_time_ms,
            version,
        }
    }

    pub fn effective_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.effective_time_ms)
    }
}

impl fmt::Display for EffectiveVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.effective_time() {
            Some(time) => write!(f, "{}@{} ({})", self.source, time.to_rfc3339(), self.version),
            None => write!(f, "{}@{}ms ({})", self.source, self.effective_time_ms, self.version),
        }
    }
}

/// Lists the snapshots that exist for a source
///
/// Returns `(effective_time_ms, version)` pairs in any order.
pub trait VersionEnumerator: Send + Sync {
    fn list_versions(&self, source: &SourceIdentity) -> Result<Vec<(i64, VersionId)>>;
}

impl<F> VersionEnumerator for F
where
    F: Fn(&SourceIdentity) -> Result<Vec<(i64, VersionId)>> + Send + Sync,
{
    fn list_versions(&self, source: &SourceIdentity) -> Result<Vec<(i64, VersionId)>> {
        self(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let version = EffectiveVersion::new("ip-to-host".into(), 0, VersionId(7));
        assert_eq!(version.to_string(), "ip-to-host@1970-01-01T00:00:00+00:00 (v7)");
        assert_eq!(SourceIdentity::new("a").id(), "a");
    }

    #[test]
    fn test_version_order() {
        assert!(VersionId(2) > VersionId(1));
        assert_eq!(VersionId::from(3), VersionId(3));
    }
}
