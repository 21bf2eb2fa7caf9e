use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{EngineError, EngineResult};

pub const DEFAULT_CONFIG_NAME: &str = "draftlens.config.json";

/// Engine configuration file format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub highlight: HighlightConfig,
    pub navigation: NavigationConfig,
    pub resolution: ResolutionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Least-recently-used entries beyond this count are evicted
    pub max_entries: usize,

    /// Entries older than this are evicted regardless of use
    pub ttl_ms: u64,

    /// Period of the expired-entry sweep
    pub sweep_interval_ms: u64,

    /// Drop suggestions whose `textToReplace` no longer matches the content
    pub drop_drifted: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            ttl_ms: 5 * 60 * 1000,
            sweep_interval_ms: 60 * 1000,
            drop_drifted: false,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HighlightConfig {
    /// Above this many suggestions only a bounded subset is rendered
    pub virtualization_threshold: usize,

    /// Number of top-scoring suggestions rendered when virtualized
    pub render_batch_size: usize,

    pub visibility_debounce_ms: u64,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            virtualization_threshold: 100,
            render_batch_size: 50,
            visibility_debounce_ms: 100,
        }
    }
}

impl HighlightConfig {
    pub fn visibility_debounce(&self) -> Duration {
        Duration::from_millis(self.visibility_debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigationConfig {
    /// Select the next suggestion when the active one is resolved
    pub auto_advance: bool,

    pub auto_advance_delay_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            auto_advance: true,
            auto_advance_delay_ms: 0,
        }
    }
}

impl NavigationConfig {
    pub fn auto_advance_delay(&self) -> Duration {
        Duration::from_millis(self.auto_advance_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolutionConfig {
    /// When false every action is dispatched immediately
    pub enable_batch_processing: bool,

    /// Soft cap on actions per batch
    pub batch_size: usize,

    /// Debounce window before the oldest eligible batch is flushed
    pub batch_delay_ms: u64,

    pub max_retries: u32,

    /// Backoff base: retry n waits `batch_delay * multiplier^n`
    pub retry_delay_multiplier: f64,

    pub auto_retry: bool,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            enable_batch_processing: true,
            batch_size: 5,
            batch_delay_ms: 300,
            max_retries: 3,
            retry_delay_multiplier: 2.0,
            auto_retry: true,
        }
    }
}

impl ResolutionConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Backoff before retry number `retry_count` (zero-based)
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        let factor = self.retry_delay_multiplier.powi(retry_count as i32);
        Duration::from_millis((self.batch_delay_ms as f64 * factor).round() as u64)
    }
}

impl EngineConfig {
    /// Load config from a JSON file, falling back to defaults if it is missing
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: EngineConfig = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(EngineConfig::default())
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.cache.max_entries == 0 {
            return Err(EngineError::InvalidConfig(
                "cache.maxEntries must be at least 1".to_string(),
            ));
        }
        if self.highlight.render_batch_size == 0 {
            return Err(EngineError::InvalidConfig(
                "highlight.renderBatchSize must be at least 1".to_string(),
            ));
        }
        if self.resolution.batch_size == 0 {
            return Err(EngineError::InvalidConfig(
                "resolution.batchSize must be at least 1".to_string(),
            ));
        }
        let multiplier = self.resolution.retry_delay_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(EngineError::InvalidConfig(format!(
                "resolution.retryDelayMultiplier must be >= 1.0, got {}",
                multiplier
            )));
        }
        Ok(())
    }
}
