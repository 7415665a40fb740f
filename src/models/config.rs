//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Minimum allowed refresh interval in seconds.
///
/// Enforcing a floor prevents hammering upstream APIs during
/// misconfiguration.
pub const MIN_REFRESH_SECS: f64 = 3.0;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Global polling defaults, overridable per store
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Global request/retry policy, overridable per store
    #[serde(default)]
    pub request: RequestPolicy,

    /// Outbound proxy addresses for rotation
    #[serde(default)]
    pub proxies: Vec<String>,

    /// Discord webhook URLs to notify
    #[serde(default)]
    pub webhooks: Vec<String>,

    /// Store definitions, one monitor per entry
    #[serde(default)]
    pub stores: Vec<StoreConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.stores.is_empty() {
            return Err(AppError::config("No stores defined"));
        }
        if self.webhooks.is_empty() {
            return Err(AppError::config("Provide at least one Discord webhook URL"));
        }
        if self.monitor.refresh_interval <= 0.0 {
            return Err(AppError::config(
                "monitor.refresh_interval must be a positive number of seconds",
            ));
        }
        for store in &self.stores {
            if store.name.trim().is_empty() {
                return Err(AppError::config("Store entry with empty name"));
            }
            if store.platform.trim().is_empty() {
                return Err(AppError::config(format!(
                    "Store '{}' has no platform",
                    store.name
                )));
            }
        }
        Ok(())
    }
}

/// Global polling behavior defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between poll iterations
    #[serde(default = "defaults::refresh_interval")]
    pub refresh_interval: f64,

    /// Random extra sleep added to each refresh interval
    #[serde(default = "defaults::jitter")]
    pub jitter: JitterRange,

    /// How products are filtered after extraction
    #[serde(default)]
    pub mode: MonitorMode,

    /// Keywords searched and matched against product titles
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Send a health-check embed on startup to confirm webhook delivery
    #[serde(default)]
    pub startup_ping: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval: defaults::refresh_interval(),
            jitter: defaults::jitter(),
            mode: MonitorMode::default(),
            keywords: Vec::new(),
            startup_ping: false,
        }
    }
}

/// Product filtering mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    /// Keep products whose title contains a configured keyword
    #[default]
    Keywords,
    /// Keep products matching configured id/URL allow-lists
    Url,
}

/// Bounds for the randomized sleep added to each refresh interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JitterRange {
    pub low: f64,
    pub high: f64,
}

impl JitterRange {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }.normalized()
    }

    /// Effective range with inverted bounds swapped and negatives clamped.
    pub fn normalized(self) -> Self {
        let low = self.low.max(0.0);
        let high = self.high.max(0.0);
        if low <= high {
            Self { low, high }
        } else {
            Self {
                low: high,
                high: low,
            }
        }
    }

    /// Draw a uniform random duration from the effective range.
    pub fn sample(&self) -> Duration {
        let range = self.normalized();
        if range.high <= 0.0 {
            return Duration::ZERO;
        }
        let secs = rand::rng().random_range(range.low..=range.high);
        Duration::from_secs_f64(secs)
    }
}

/// Retry/backoff policy for the fetch client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPolicy {
    /// Maximum attempts per logical request
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base backoff in seconds, multiplied by the attempt number
    #[serde(default = "defaults::backoff_factor")]
    pub backoff_factor: f64,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl RequestPolicy {
    /// Clamp values into their legal ranges.
    pub fn normalized(mut self) -> Self {
        self.max_retries = self.max_retries.max(1);
        self.backoff_factor = self.backoff_factor.max(0.1);
        self.timeout_secs = self.timeout_secs.max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            backoff_factor: defaults::backoff_factor(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// One store entry as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Display name, also used as the source tag on products
    pub name: String,

    /// Extractor to use ("shopify", "snkrs")
    pub platform: String,

    /// Store-specific base URL
    #[serde(default)]
    pub base_url: String,

    /// Search path template with a `{query}` placeholder
    #[serde(default)]
    pub search_path: Option<String>,

    /// Override of the global refresh interval
    #[serde(default)]
    pub refresh_interval: Option<f64>,

    /// Override of the global jitter range
    #[serde(default)]
    pub jitter: Option<JitterRange>,

    /// Override of the global keyword list
    #[serde(default)]
    pub keywords: Option<Vec<String>>,

    /// Override of the global filtering mode
    #[serde(default)]
    pub mode: Option<MonitorMode>,

    /// Product id allow-list for `url` mode
    #[serde(default)]
    pub product_ids: Vec<String>,

    /// Product URL allow-list for `url` mode
    #[serde(default)]
    pub product_urls: Vec<String>,

    /// Override of the global retry budget
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Override of the global backoff factor
    #[serde(default)]
    pub backoff_factor: Option<f64>,

    /// Override of the global request timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Immutable per-store schedule, resolved once at startup.
///
/// Store overrides are merged onto the global defaults here so monitors
/// never consult shared mutable configuration at runtime.
#[derive(Debug, Clone)]
pub struct StoreSchedule {
    pub name: String,
    pub platform: String,
    pub base_url: String,
    pub search_path: Option<String>,
    pub refresh: Duration,
    pub jitter: JitterRange,
    pub mode: MonitorMode,
    pub keywords: Vec<String>,
    pub product_ids: Vec<String>,
    pub product_urls: Vec<String>,
    pub policy: RequestPolicy,
}

impl StoreSchedule {
    /// Merge a store entry with the global defaults.
    pub fn resolve(store: &StoreConfig, config: &Config) -> Self {
        let refresh_secs = store
            .refresh_interval
            .unwrap_or(config.monitor.refresh_interval)
            .max(MIN_REFRESH_SECS);

        let keywords = store
            .keywords
            .clone()
            .unwrap_or_else(|| config.monitor.keywords.clone())
            .into_iter()
            .map(|k| k.to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        let policy = RequestPolicy {
            max_retries: store.max_retries.unwrap_or(config.request.max_retries),
            backoff_factor: store
                .backoff_factor
                .unwrap_or(config.request.backoff_factor),
            timeout_secs: store.timeout_secs.unwrap_or(config.request.timeout_secs),
        }
        .normalized();

        Self {
            name: store.name.clone(),
            platform: store.platform.to_lowercase(),
            base_url: store.base_url.trim_end_matches('/').to_string(),
            search_path: store.search_path.clone(),
            refresh: Duration::from_secs_f64(refresh_secs),
            jitter: store.jitter.unwrap_or(config.monitor.jitter).normalized(),
            mode: store.mode.unwrap_or(config.monitor.mode),
            keywords,
            product_ids: lowercase_all(&store.product_ids),
            product_urls: lowercase_all(&store.product_urls),
            policy,
        }
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

mod defaults {
    use super::JitterRange;

    pub fn refresh_interval() -> f64 {
        15.0
    }
    pub fn jitter() -> JitterRange {
        JitterRange {
            low: 0.5,
            high: 1.5,
        }
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn backoff_factor() -> f64 {
        1.5
    }
    pub fn timeout() -> u64 {
        10
    }
}
