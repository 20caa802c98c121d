//! Configuration keys and defaults

pub const ENV_PREFIX: &str = "beacon";
pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";

pub const SERVER_ADDRESS: &str = "server.address";
pub const SERVER_PORT: &str = "server.port";
pub const SERVER_CONTEXT_PATH: &str = "server.context-path";
pub const SERVER_SHUTDOWN_TIMEOUT_SECS: &str = "server.shutdown-timeout-secs";
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

pub const PERSISTENCE_MODE: &str = "beacon.persistence.mode";
pub const DB_URL: &str = "db.url";

pub const LOG_PATH: &str = "beacon.logs.path";
pub const LOG_LEVEL: &str = "beacon.logs.level";
pub const LOG_CONSOLE: &str = "beacon.logs.console";
pub const LOG_FILE: &str = "beacon.logs.file";

pub const NAMESPACE_LOCK_SWITCH_OFF: &str = "beacon.namespace.lock.switch-off";
pub const RELEASE_MESSAGE_SCAN_INTERVAL_MS: &str = "beacon.release-message.scan.interval-ms";
pub const RELEASE_MESSAGE_SCAN_BATCH_SIZE: &str = "beacon.release-message.scan.batch-size";
pub const RELEASE_MESSAGE_CLEAN_BATCH_SIZE: &str = "beacon.release-message.clean.batch-size";
pub const RELEASE_MESSAGE_CLEAN_QUEUE_SIZE: &str = "beacon.release-message.clean.queue-size";
pub const RELEASE_MESSAGE_CACHE_SCAN_INTERVAL_SECS: &str =
    "beacon.release-message.cache.scan.interval-secs";
pub const GRAY_RULE_SCAN_INTERVAL_SECS: &str = "beacon.gray-rule.scan.interval-secs";
pub const GRAY_RULE_SCAN_BATCH_SIZE: &str = "beacon.gray-rule.scan.batch-size";
pub const CONFIG_CACHE_ENABLED: &str = "beacon.config-cache.enabled";
pub const CONFIG_CACHE_TTL_SECS: &str = "beacon.config-cache.ttl-secs";
pub const CONFIG_CACHE_MAX_CAPACITY: &str = "beacon.config-cache.max-capacity";
pub const LONG_POLLING_TIMEOUT_SECS: &str = "beacon.long-polling.timeout-secs";
