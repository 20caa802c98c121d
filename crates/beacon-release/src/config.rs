//! Tunables of the release engine

use std::time::Duration;

pub const DEFAULT_RELEASE_MESSAGE_SCAN_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_RELEASE_MESSAGE_SCAN_BATCH_SIZE: u64 = 500;
pub const DEFAULT_RELEASE_MESSAGE_CLEAN_BATCH_SIZE: u64 = 100;
pub const DEFAULT_RELEASE_MESSAGE_CLEAN_QUEUE_SIZE: usize = 100;
pub const DEFAULT_RELEASE_MESSAGE_CACHE_SCAN_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_GRAY_RULE_SCAN_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_GRAY_RULE_SCAN_BATCH_SIZE: u64 = 500;
pub const DEFAULT_CONFIG_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_CONFIG_CACHE_MAX_CAPACITY: u64 = 10_000;
pub const DEFAULT_LONG_POLLING_TIMEOUT_SECS: u64 = 60;
pub const MIN_LONG_POLLING_TIMEOUT_SECS: u64 = 1;
pub const MAX_LONG_POLLING_TIMEOUT_SECS: u64 = 90;

/// Release engine configuration
#[derive(Debug, Clone)]
pub struct ReleaseEngineConfig {
    pub release_message_scan_interval: Duration,
    pub release_message_scan_batch_size: u64,
    pub release_message_clean_batch_size: u64,
    pub release_message_clean_queue_size: usize,
    pub release_message_cache_scan_interval: Duration,
    pub gray_rule_scan_interval: Duration,
    pub gray_rule_scan_batch_size: u64,
    /// Serve resolver reads from the in-process cache
    pub config_cache_enabled: bool,
    pub config_cache_ttl: Duration,
    pub config_cache_max_capacity: u64,
    /// Disables namespace lock acquire and release entirely
    pub namespace_lock_switch_off: bool,
    pub long_polling_timeout: Duration,
}

impl Default for ReleaseEngineConfig {
    fn default() -> Self {
        Self {
            release_message_scan_interval: Duration::from_millis(
                DEFAULT_RELEASE_MESSAGE_SCAN_INTERVAL_MS,
            ),
            release_message_scan_batch_size: DEFAULT_RELEASE_MESSAGE_SCAN_BATCH_SIZE,
            release_message_clean_batch_size: DEFAULT_RELEASE_MESSAGE_CLEAN_BATCH_SIZE,
            release_message_clean_queue_size: DEFAULT_RELEASE_MESSAGE_CLEAN_QUEUE_SIZE,
            release_message_cache_scan_interval: Duration::from_secs(
                DEFAULT_RELEASE_MESSAGE_CACHE_SCAN_INTERVAL_SECS,
            ),
            gray_rule_scan_interval: Duration::from_secs(DEFAULT_GRAY_RULE_SCAN_INTERVAL_SECS),
            gray_rule_scan_batch_size: DEFAULT_GRAY_RULE_SCAN_BATCH_SIZE,
            config_cache_enabled: false,
            config_cache_ttl: Duration::from_secs(DEFAULT_CONFIG_CACHE_TTL_SECS),
            config_cache_max_capacity: DEFAULT_CONFIG_CACHE_MAX_CAPACITY,
            namespace_lock_switch_off: false,
            long_polling_timeout: Duration::from_secs(DEFAULT_LONG_POLLING_TIMEOUT_SECS),
        }
    }
}

/// Clamp a long polling timeout into the accepted range, falling back to the
/// default when out of bounds
pub fn check_long_polling_timeout(secs: u64) -> Duration {
    if (MIN_LONG_POLLING_TIMEOUT_SECS..=MAX_LONG_POLLING_TIMEOUT_SECS).contains(&secs) {
        Duration::from_secs(secs)
    } else {
        Duration::from_secs(DEFAULT_LONG_POLLING_TIMEOUT_SECS)
    }
}
