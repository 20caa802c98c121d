//! Configuration management for Beacon server
//!
//! Sources, lowest precedence first: `conf/application.yml`, environment
//! variables prefixed with `beacon` and command line overrides.

use std::time::Duration;

use clap::Parser;
use config::{Config, Environment};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use beacon_persistence::StorageMode;
use beacon_release::ReleaseEngineConfig;
use beacon_release::config::{
    DEFAULT_CONFIG_CACHE_MAX_CAPACITY, DEFAULT_CONFIG_CACHE_TTL_SECS,
    DEFAULT_GRAY_RULE_SCAN_BATCH_SIZE, DEFAULT_GRAY_RULE_SCAN_INTERVAL_SECS,
    DEFAULT_LONG_POLLING_TIMEOUT_SECS, DEFAULT_RELEASE_MESSAGE_CACHE_SCAN_INTERVAL_SECS,
    DEFAULT_RELEASE_MESSAGE_CLEAN_BATCH_SIZE, DEFAULT_RELEASE_MESSAGE_CLEAN_QUEUE_SIZE,
    DEFAULT_RELEASE_MESSAGE_SCAN_BATCH_SIZE, DEFAULT_RELEASE_MESSAGE_SCAN_INTERVAL_MS,
    check_long_polling_timeout,
};

use super::constants::*;
use crate::startup::LoggingConfig;

/// Command line arguments for the server
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Persistence mode: `memory` or `external_db`
    #[arg(short = 'm', long = "mode")]
    mode: Option<String>,
    #[arg(long = "db-url", env = "DATABASE_URL")]
    database_url: Option<String>,
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    config_file: String,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load from the command line, the config file and the environment
    pub fn new() -> anyhow::Result<Self> {
        let args = Cli::parse();
        let mut config_builder = Config::builder()
            .add_source(config::File::with_name(&args.config_file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(".")
                    .keep_prefix(true)
                    .try_parsing(true),
            );

        if let Some(v) = args.mode {
            config_builder = config_builder.set_override(PERSISTENCE_MODE, v)?;
        }
        if let Some(v) = args.database_url {
            config_builder = config_builder.set_override(DB_URL, v)?;
        }

        Ok(Self::from_config(config_builder.build()?))
    }

    pub fn from_config(config: Config) -> Self {
        Configuration { config }
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string(SERVER_ADDRESS)
            .unwrap_or(DEFAULT_SERVER_ADDRESS.to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.config
            .get_int(SERVER_PORT)
            .ok()
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    /// Path prefix of every route, empty for none
    pub fn server_context_path(&self) -> String {
        let path = self.config.get_string(SERVER_CONTEXT_PATH).unwrap_or_default();
        let path = path.trim_matches('/');
        if path.is_empty() {
            String::new()
        } else {
            format!("/{}", path)
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.get_u64(
            SERVER_SHUTDOWN_TIMEOUT_SECS,
            DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        ))
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    /// Settings from the config file; `BEACON_LOG_*` variables win
    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string(LOG_PATH).ok().filter(|p| !p.is_empty()),
            self.config.get_bool(LOG_CONSOLE).unwrap_or(true),
            self.config.get_bool(LOG_FILE).unwrap_or(false),
            self.config
                .get_string(LOG_LEVEL)
                .unwrap_or("info".to_string()),
        )
        .with_env_overrides()
    }

    // ========================================================================
    // Persistence Configuration
    // ========================================================================

    /// Unknown modes fall back to the in-process backend
    pub fn persistence_mode(&self) -> StorageMode {
        match self.config.get_string(PERSISTENCE_MODE) {
            Ok(mode) => mode.parse().unwrap_or_else(|e| {
                tracing::warn!("{}, falling back to memory", e);
                StorageMode::Memory
            }),
            Err(_) => StorageMode::Memory,
        }
    }

    pub async fn database_connection(&self) -> anyhow::Result<DatabaseConnection> {
        let max_connections = self.get_u64("db.pool.max-connections", 100) as u32;
        let min_connections = self.get_u64("db.pool.min-connections", 1) as u32;
        let connect_timeout = self.get_u64("db.pool.connect-timeout-secs", 30);
        let acquire_timeout = self.get_u64("db.pool.acquire-timeout-secs", 8);
        let idle_timeout = self.get_u64("db.pool.idle-timeout-secs", 10);
        let max_lifetime = self.get_u64("db.pool.max-lifetime-secs", 1800);
        let sqlx_logging = self.config.get_bool("db.pool.sqlx-logging").unwrap_or(false);

        let url = self.config.get_string(DB_URL)?;

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .acquire_timeout(Duration::from_secs(acquire_timeout))
            .idle_timeout(Duration::from_secs(idle_timeout))
            .max_lifetime(Duration::from_secs(max_lifetime))
            .sqlx_logging(sqlx_logging);

        tracing::info!(
            max_connections,
            min_connections,
            connect_timeout,
            idle_timeout,
            max_lifetime,
            sqlx_logging,
            "Database connection pool configured"
        );

        Ok(Database::connect(opt).await?)
    }

    // ========================================================================
    // Release Engine Configuration
    // ========================================================================

    pub fn engine_config(&self) -> ReleaseEngineConfig {
        ReleaseEngineConfig {
            release_message_scan_interval: Duration::from_millis(self.get_u64(
                RELEASE_MESSAGE_SCAN_INTERVAL_MS,
                DEFAULT_RELEASE_MESSAGE_SCAN_INTERVAL_MS,
            )),
            release_message_scan_batch_size: self.get_u64(
                RELEASE_MESSAGE_SCAN_BATCH_SIZE,
                DEFAULT_RELEASE_MESSAGE_SCAN_BATCH_SIZE,
            ),
            release_message_clean_batch_size: self.get_u64(
                RELEASE_MESSAGE_CLEAN_BATCH_SIZE,
                DEFAULT_RELEASE_MESSAGE_CLEAN_BATCH_SIZE,
            ),
            release_message_clean_queue_size: self.get_u64(
                RELEASE_MESSAGE_CLEAN_QUEUE_SIZE,
                DEFAULT_RELEASE_MESSAGE_CLEAN_QUEUE_SIZE as u64,
            ) as usize,
            release_message_cache_scan_interval: Duration::from_secs(self.get_u64(
                RELEASE_MESSAGE_CACHE_SCAN_INTERVAL_SECS,
                DEFAULT_RELEASE_MESSAGE_CACHE_SCAN_INTERVAL_SECS,
            )),
            gray_rule_scan_interval: Duration::from_secs(self.get_u64(
                GRAY_RULE_SCAN_INTERVAL_SECS,
                DEFAULT_GRAY_RULE_SCAN_INTERVAL_SECS,
            )),
            gray_rule_scan_batch_size: self.get_u64(
                GRAY_RULE_SCAN_BATCH_SIZE,
                DEFAULT_GRAY_RULE_SCAN_BATCH_SIZE,
            ),
            config_cache_enabled: self.config.get_bool(CONFIG_CACHE_ENABLED).unwrap_or(false),
            config_cache_ttl: Duration::from_secs(
                self.get_u64(CONFIG_CACHE_TTL_SECS, DEFAULT_CONFIG_CACHE_TTL_SECS),
            ),
            config_cache_max_capacity: self.get_u64(
                CONFIG_CACHE_MAX_CAPACITY,
                DEFAULT_CONFIG_CACHE_MAX_CAPACITY,
            ),
            namespace_lock_switch_off: self
                .config
                .get_bool(NAMESPACE_LOCK_SWITCH_OFF)
                .unwrap_or(false),
            long_polling_timeout: check_long_polling_timeout(self.get_u64(
                LONG_POLLING_TIMEOUT_SECS,
                DEFAULT_LONG_POLLING_TIMEOUT_SECS,
            )),
        }
    }

    fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.config
            .get_int(key)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(default)
    }
}
