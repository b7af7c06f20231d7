//! Configuration for the reference data core
//!
//! All settings are read once at construction time. Nothing here is global:
//! a `RefDataConfig` is built (from defaults, a TOML file, or the environment)
//! and handed to the components that need it.
//!
//! ```toml
//! [byte_buffer_pool]
//! block_on_exhausted_pool = false
//! warning_threshold_percentage = 90
//!
//! [byte_buffer_pool.pooled_byte_buffer_counts]
//! 1 = 50
//! 10 = 50
//! 100 = 50
//! 1000 = 50
//! 10000 = 50
//!
//! [effective_version_cache]
//! ttl_ms = 600000
//!
//! [effective_version_cache.source_ttl_ms]
//! "IP_TO_HOST" = 60000
//!
//! [store_cache]
//! max_stores = 100
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Environment variable prefix for overrides, e.g. `REFDATA__STORE_CACHE__MAX_STORES=10`
pub const ENV_PREFIX: &str = "REFDATA";

/// Top level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefDataConfig {
    pub byte_buffer_pool: ByteBufferPoolConfig,
    pub effective_version_cache: EffectiveVersionCacheConfig,
    pub store_cache: StoreCacheConfig,
}

impl RefDataConfig {
    /// Load from a TOML file, applying `REFDATA__*` environment overrides on top
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = ?path, "Loading reference data configuration");

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let cfg: Self = settings
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: Self =
            toml::from_str(text).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.byte_buffer_pool.validate()?;
        self.store_cache.validate()
    }
}

/// Sizing and exhaustion policy for the byte buffer pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ByteBufferPoolConfig {
    /// Buffer capacity (a power of ten) to the maximum number of buffers of that
    /// capacity held by the pool. Zero means the capacity is never pooled.
    /// Keys are strings because TOML table keys always are.
    pub pooled_byte_buffer_counts: BTreeMap<String, u32>,
    /// Wait for a buffer to be released instead of allocating past the limit
    pub block_on_exhausted_pool: bool,
    /// How often a blocked caller re-checks its termination signal
    pub block_poll_interval_ms: u64,
    /// Overall time a blocked caller waits before giving up
    pub block_timeout_ms: u64,
    /// Percentage of a tier's limit at which a warning is logged
    pub warning_threshold_percentage: u32,
    /// Zero every released buffer before it can be handed out again
    pub zero_on_release: bool,
}

impl Default for ByteBufferPoolConfig {
    fn default() -> Self {
        let pooled_byte_buffer_counts = [1, 10, 100, 1_000, 10_000]
            .into_iter()
            .map(|capacity: u32| (capacity.to_string(), 50))
            .collect();
        Self {
            pooled_byte_buffer_counts,
            block_on_exhausted_pool: false,
            block_poll_interval_ms: 100,
            block_timeout_ms: 60_000,
            warning_threshold_percentage: 90,
            zero_on_release: true,
        }
    }
}

impl ByteBufferPoolConfig {
    /// Config with the given tier counts and defaults for everything else
    pub fn with_counts<I: IntoIterator<Item = (u32, u32)>>(counts: I) -> Self {
        Self {
            pooled_byte_buffer_counts: counts
                .into_iter()
                .map(|(capacity, count)| (capacity.to_string(), count))
                .collect(),
            ..Self::default()
        }
    }

    /// Configured counts keyed by numeric capacity
    pub fn tier_counts(&self) -> Result<BTreeMap<u32, u32>> {
        self.pooled_byte_buffer_counts
            .iter()
            .map(|(capacity, count)| {
                let capacity: u32 = capacity.trim().parse().map_err(|_| {
                    Error::Config(format!("Pooled buffer capacity '{}' is not a number", capacity))
                })?;
                if !is_power_of_ten(capacity) {
                    return Err(Error::Config(format!(
                        "Pooled buffer capacity {} is not a power of ten",
                        capacity
                    )));
                }
                Ok((capacity, *count))
            })
            .collect()
    }

    pub fn block_on_exhausted(mut self, block: bool) -> Self {
        self.block_on_exhausted_pool = block;
        self
    }

    pub fn block_poll_interval(&self) -> Duration {
        Duration::from_millis(self.block_poll_interval_ms)
    }

    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.tier_counts()?;
        if self.warning_threshold_percentage == 0 || self.warning_threshold_percentage > 100 {
            return Err(Error::Config(format!(
                "warning_threshold_percentage must be in 1..=100, got {}",
                self.warning_threshold_percentage
            )));
        }
        if self.block_on_exhausted_pool && self.block_poll_interval_ms == 0 {
            return Err(Error::Config(
                "block_poll_interval_ms must be non-zero when blocking".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expiry policy for the per-source effective version sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectiveVersionCacheConfig {
    /// Time a version set is trusted before the enumerator is asked again
    pub ttl_ms: u64,
    /// Overrides keyed by source identity name, matched ignoring ASCII case
    /// since file and environment keys arrive lowercased
    pub source_ttl_ms: HashMap<String, u64>,
}

impl Default for EffectiveVersionCacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 10 * 60 * 1000,
            source_ttl_ms: HashMap::new(),
        }
    }
}

impl EffectiveVersionCacheConfig {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl_ms: ttl.as_millis() as u64,
            source_ttl_ms: HashMap::new(),
        }
    }

    pub fn ttl_for(&self, source: &str) -> Duration {
        let ttl_ms = self.source_ttl_ms.get(source).copied().or_else(|| {
            self.source_ttl_ms
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(source))
                .map(|(_, ttl_ms)| *ttl_ms)
        });
        Duration::from_millis(ttl_ms.unwrap_or(self.ttl_ms))
    }
}

/// Bounds for the loaded store cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreCacheConfig {
    pub max_stores: usize,
}

impl Default for StoreCacheConfig {
    fn default() -> Self {
        Self { max_stores: 100 }
    }
}

impl StoreCacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_stores == 0 {
            return Err(Error::Config("max_stores must be at least 1".to_string()));
        }
        Ok(())
    }
}

pub(crate) fn is_power_of_ten(n: u32) -> bool {
    matches!(
        n,
        1 | 10
            | 100
            | 1_000
            | 10_000
            | 100_000
            | 1_000_000
            | 10_000_000
            | 100_000_000
            | 1_000_000_000
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() -> Result<()> {
        let cfg = RefDataConfig::default();
        cfg.validate()?;
        assert_eq!(cfg.byte_buffer_pool.pooled_byte_buffer_counts.len(), 5);
        assert!(cfg.byte_buffer_pool.zero_on_release);
        assert_eq!(cfg.store_cache.max_stores, 100);
        Ok(())
    }

    #[test]
    fn test_from_toml() -> Result<()> {
        let cfg = RefDataConfig::from_toml_str(
            r#"
            [byte_buffer_pool]
            block_on_exhausted_pool = true
            block_poll_interval_ms = 5

            [byte_buffer_pool.pooled_byte_buffer_counts]
            1 = 20
            100 = 10

            [effective_version_cache]
            ttl_ms = 1000

            [effective_version_cache.source_ttl_ms]
            IP_TO_HOST = 50
            "#,
        )?;

        let pool = &cfg.byte_buffer_pool;
        assert!(pool.block_on_exhausted_pool);
        assert_eq!(pool.block_poll_interval(), Duration::from_millis(5));
        let counts = pool.tier_counts()?;
        assert_eq!(counts.get(&100), Some(&10));
        assert_eq!(counts.get(&10), None);

        let evc = &cfg.effective_version_cache;
        assert_eq!(evc.ttl_for("IP_TO_HOST"), Duration::from_millis(50));
        assert_eq!(evc.ttl_for("OTHER"), Duration::from_millis(1000));
        Ok(())
    }

    #[test]
    fn test_rejects_non_power_of_ten() {
        let cfg = ByteBufferPoolConfig::with_counts([(1, 5), (50, 5)]);
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_non_numeric_capacity() {
        let mut cfg = ByteBufferPoolConfig::default();
        cfg.pooled_byte_buffer_counts.insert("big".to_string(), 1);
        assert!(matches!(cfg.tier_counts(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let mut cfg = ByteBufferPoolConfig::default();
        cfg.warning_threshold_percentage = 0;
        assert!(cfg.validate().is_err());
        cfg.warning_threshold_percentage = 101;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_file() -> Result<()> {
        let path = std::env::temp_dir().join(format!("refdata_cfg_{}.toml", std::process::id()));
        std::fs::write(&path, "[store_cache]\nmax_stores = 7\n")
            .map_err(|e| Error::Internal(e.to_string()))?;

        let cfg = RefDataConfig::load(&path)?;
        assert_eq!(cfg.store_cache.max_stores, 7);
        assert_eq!(cfg.byte_buffer_pool, ByteBufferPoolConfig::default());

        std::fs::remove_file(path).ok();
        Ok(())
    }

    #[test]
    fn test_source_ttl_from_file_keeps_upper_case_ids() -> Result<()> {
        let path = std::env::temp_dir().join(format!("refdata_ttl_{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[effective_version_cache]\nttl_ms = 1000\n\n[effective_version_cache.source_ttl_ms]\nIP_TO_HOST = 50\n",
        )
        .map_err(|e| Error::Internal(e.to_string()))?;

        let cfg = RefDataConfig::load(&path)?;
        std::fs::remove_file(&path).ok();

        let versions = &cfg.effective_version_cache;
        assert_eq!(versions.ttl_for("IP_TO_HOST"), Duration::from_millis(50));
        assert_eq!(versions.ttl_for("ip_to_host"), Duration::from_millis(50));
        assert_eq!(versions.ttl_for("HOST_TO_TEAM"), Duration::from_millis(1000));
        Ok(())
    }

    #[test]
    fn test_power_of_ten() {
        assert!(is_power_of_ten(1));
        assert!(is_power_of_ten(1_000_000_000));
        assert!(!is_power_of_ten(0));
        assert!(!is_power_of_ten(50));
    }
}
