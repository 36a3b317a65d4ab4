//! Application configuration.
//!
//! Loaded once at process start from environment variables with documented
//! defaults — the same shape as the `AssetConfig`/`SymbolConfig`/
//! `TradingConfig` triple this crate already used for trading-pair setup,
//! adapted to a single flat `AppConfig` since there is no per-sku config to
//! load, just process-wide tuning knobs (spec §6's "Configuration options").

use std::time::Duration;

/// Process-wide configuration. Construct once via [`AppConfig::from_env`] and
/// pass it (or the pieces each component needs) down as explicit
/// dependencies — no global/singleton instance.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// How long a RESERVED hold lives before the sweeper expires it.
    pub hold_duration: Duration,
    /// Max messages the batch consumer pulls from a partition per iteration.
    pub batch_size: usize,
    /// Soft cap on how long the batch consumer waits to fill a batch.
    pub batch_wait: Duration,
    /// Max polling iterations before the Poller gives up and returns TIMEOUT.
    pub poll_max_attempts: u32,
    /// Poller's sleep interval for the first `poll_backoff_after_attempts`.
    pub poll_initial_interval: Duration,
    /// Poller's sleep interval cap once backoff kicks in.
    pub poll_max_interval: Duration,
    /// Number of initial attempts before the Poller starts doubling its
    /// sleep interval.
    pub poll_backoff_after_attempts: u32,
    /// How often the Expiry Sweeper scans for stale holds.
    pub sweeper_interval: Duration,
    /// TTL for the `stock:{sku}` availability cache entry.
    pub stock_cache_ttl: Duration,
    /// TTL for the `reject:{user}:{sku}` cache entry.
    pub reject_cache_ttl: Duration,
    /// Number of partitions in the ordered log (= max single-writer
    /// concurrency across skus).
    pub partitions: usize,
    /// Depth of each partition's bounded queue.
    pub partition_capacity: usize,
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Address the gateway's HTTP listener binds to.
    pub gateway_bind_addr: String,
    /// Emit JSON-formatted logs instead of compact text.
    pub log_json: bool,
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults documented in spec §6 for anything unset.
    pub fn from_env() -> Self {
        Self {
            hold_duration: Duration::from_secs(env_u64(
                "RESERVATION_HOLD_DURATION_SECONDS",
                120,
            )),
            batch_size: env_usize("RESERVATION_BATCH_SIZE", 250),
            batch_wait: Duration::from_millis(env_u64("RESERVATION_BATCH_WAIT_MS", 10)),
            poll_max_attempts: env_u32("RESERVATION_POLL_MAX_ATTEMPTS", 100),
            poll_initial_interval: Duration::from_millis(env_u64(
                "RESERVATION_POLL_INITIAL_INTERVAL_MS",
                5,
            )),
            poll_max_interval: Duration::from_millis(env_u64(
                "RESERVATION_POLL_MAX_INTERVAL_MS",
                100,
            )),
            poll_backoff_after_attempts: env_u32("RESERVATION_POLL_BACKOFF_AFTER_ATTEMPTS", 5),
            sweeper_interval: Duration::from_millis(env_u64(
                "RESERVATION_SWEEPER_INTERVAL_MS",
                10_000,
            )),
            stock_cache_ttl: Duration::from_secs(env_u64("RESERVATION_STOCK_CACHE_TTL_S", 5)),
            reject_cache_ttl: Duration::from_secs(env_u64("RESERVATION_REJECT_CACHE_TTL_S", 5)),
            partitions: env_usize("RESERVATION_PARTITIONS", 8),
            partition_capacity: env_usize("RESERVATION_PARTITION_CAPACITY", 16_384),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/flash_sale".to_string()),
            gateway_bind_addr: std::env::var("GATEWAY_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            log_json: std::env::var("LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = AppConfig::from_env();
        assert_eq!(cfg.hold_duration, Duration::from_secs(120));
        assert_eq!(cfg.batch_size, 250);
        assert_eq!(cfg.batch_wait, Duration::from_millis(10));
    }
}
