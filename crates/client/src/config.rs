use std::{env, path::PathBuf, time::Duration};

use clinicsync_core::cache::{threshold_bytes, DEFAULT_MAX_SIZE_BYTES, DEFAULT_THRESHOLD_PERCENT};

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum cache footprint in bytes (default: 50 MiB)
    pub max_cache_bytes: usize,
    /// Percent of `max_cache_bytes` that triggers eviction (default: 80)
    pub eviction_threshold_percent: u8,
    /// Seconds between background cleanups (default: 300)
    pub cleanup_interval_seconds: u64,
    /// Additional attempts after a failed read (default: 2)
    pub read_retries: u32,
    /// Base delay between read retries in milliseconds, doubled per attempt (default: 1,000)
    pub retry_delay_ms: u64,
    /// Where to persist cached records across restarts (default: unset, no persistence)
    pub persist_path: Option<PathBuf>,
    /// API base URL (default: "http://localhost:3000")
    pub base_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CLINICSYNC_MAX_CACHE_BYTES` - Maximum cache size (default: 52,428,800)
    /// - `CLINICSYNC_EVICTION_THRESHOLD_PERCENT` - Cleanup threshold (default: 80)
    /// - `CLINICSYNC_CLEANUP_INTERVAL_SECONDS` - Cleanup interval (default: 300)
    /// - `CLINICSYNC_READ_RETRIES` - Read retries (default: 2)
    /// - `CLINICSYNC_RETRY_DELAY_MS` - Retry base delay (default: 1,000)
    /// - `CLINICSYNC_PERSIST_PATH` - Persisted state file (default: unset)
    /// - `CLINICSYNC_URL` - API base URL (default: "http://localhost:3000")
    pub fn from_env() -> Self {
        Self {
            max_cache_bytes: parse_var("CLINICSYNC_MAX_CACHE_BYTES")
                .unwrap_or(DEFAULT_MAX_SIZE_BYTES),
            eviction_threshold_percent: parse_var("CLINICSYNC_EVICTION_THRESHOLD_PERCENT")
                .map(|p: u8| p.min(100))
                .unwrap_or(DEFAULT_THRESHOLD_PERCENT),
            cleanup_interval_seconds: parse_var("CLINICSYNC_CLEANUP_INTERVAL_SECONDS")
                .unwrap_or(300),
            read_retries: parse_var("CLINICSYNC_READ_RETRIES").unwrap_or(2),
            retry_delay_ms: parse_var("CLINICSYNC_RETRY_DELAY_MS").unwrap_or(1_000),
            persist_path: env::var("CLINICSYNC_PERSIST_PATH")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            base_url: env::var("CLINICSYNC_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        }
    }

    /// Size above which cleanup starts evicting.
    pub fn eviction_threshold_bytes(&self) -> usize {
        threshold_bytes(self.max_cache_bytes, self.eviction_threshold_percent)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Defaults with no retry delay, for tests.
    pub fn for_tests() -> Self {
        Self {
            max_cache_bytes: DEFAULT_MAX_SIZE_BYTES,
            eviction_threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            cleanup_interval_seconds: 300,
            read_retries: 2,
            retry_delay_ms: 0,
            persist_path: None,
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
