//! File-based logging with per-component files.
//!
//! Besides the console, events go to a root `beacon.log` and to one rolling
//! file per component, routed by their `tracing` target:
//!
//! | Log File              | Component                         | Target Prefixes                      |
//! |-----------------------|-----------------------------------|--------------------------------------|
//! | beacon.log            | Root logger (all components)      | (all)                                |
//! | release-message.log   | Change log sender/scanner/cache   | beacon_release::message, ::engine    |
//! | gray-rule.log         | Gray release rules                | beacon_release::gray                 |
//! | config-service.log    | Release resolution and caches     | beacon_release::service::config*, .. |
//! | namespace-lock.log    | Namespace lock and write path     | beacon_release::service::namespace*, |
//! | persistence.log       | Database persistence              | beacon_persistence                   |
//! | http.log              | HTTP API                          | beacon_server::api, actix_web        |
//!
//! Log files are stored in `~/beacon/logs` by default.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

struct ComponentLogDef {
    file_name: &'static str,
    targets: &'static [&'static str],
}

const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "release-message.log",
        targets: &["beacon_release::message", "beacon_release::engine"],
    },
    ComponentLogDef {
        file_name: "gray-rule.log",
        targets: &["beacon_release::gray"],
    },
    ComponentLogDef {
        file_name: "config-service.log",
        targets: &[
            "beacon_release::service::config_service",
            "beacon_release::service::cached_config_service",
            "beacon_release::service::config_file_service",
            "beacon_release::service::notification_service",
        ],
    },
    ComponentLogDef {
        file_name: "namespace-lock.log",
        targets: &[
            "beacon_release::service::namespace_lock_service",
            "beacon_release::service::item_service",
            "beacon_release::service::release_service",
            "beacon_release::service::branch_service",
        ],
    },
    ComponentLogDef {
        file_name: "persistence.log",
        targets: &["beacon_persistence", "sea_orm", "sqlx"],
    },
    ComponentLogDef {
        file_name: "http.log",
        targets: &["beacon_server::api", "actix_web"],
    },
];

#[derive(Debug, Clone, Copy)]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Logging configuration for the entire application.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Base log directory (default: `~/beacon/logs`)
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub console_level: Level,
    pub file_logging: bool,
    pub file_level: Level,
    pub rotation: LogRotation,
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/beacon/logs", home))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            console_level: Level::INFO,
            file_logging: false,
            file_level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Create from application configuration.
    pub fn from_config(
        log_dir: Option<String>,
        console_output: bool,
        file_logging: bool,
        level: String,
    ) -> Self {
        let level = level.parse().unwrap_or(Level::INFO);
        Self {
            log_dir: log_dir.map(PathBuf::from).unwrap_or_else(default_log_dir),
            console_output,
            console_level: level,
            file_logging,
            file_level: level,
            rotation: LogRotation::Daily,
        }
    }

    /// Apply `BEACON_LOG_DIR`, `BEACON_LOG_LEVEL`, `BEACON_LOG_CONSOLE` and
    /// `BEACON_LOG_FILE`
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = var("BEACON_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(level) = var("BEACON_LOG_LEVEL").and_then(|v| v.parse().ok()) {
            self.console_level = level;
            self.file_level = level;
        }
        if let Some(v) = var("BEACON_LOG_CONSOLE") {
            self.console_output = v.to_lowercase() != "false" && v != "0";
        }
        if let Some(v) = var("BEACON_LOG_FILE") {
            self.file_logging = v.to_lowercase() == "true" || v == "1";
        }
        self
    }
}

/// Keeps the non-blocking file writers alive; dropping it flushes them.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

/// Initialize the global subscriber.
///
/// `RUST_LOG`, when set, replaces the configured level for the console and
/// root file. Component files take every event of their targets.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.console_level.to_string()));
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter);
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        let root_appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, "beacon.log");
        let (root_nb, root_guard) = tracing_appender::non_blocking(root_appender);
        guards.push(root_guard);

        let root_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.file_level.to_string()));
        let root_layer = fmt::layer()
            .with_writer(root_nb)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_filter(root_filter);
        layers.push(Box::new(root_layer));

        let component_level: LevelFilter = config.file_level.into();
        for component in COMPONENT_LOGS {
            let appender = RollingFileAppender::new(
                config.rotation.into(),
                &config.log_dir,
                component.file_name,
            );
            let (nb, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);

            let targets = component
                .targets
                .iter()
                .fold(Targets::new(), |targets, target| {
                    targets.with_target(*target, component_level)
                });

            let layer = fmt::layer()
                .with_writer(nb)
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(false)
                .with_filter(targets);
            layers.push(Box::new(layer));
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            "File logging initialized: beacon.log (root) + {} component log files",
            COMPONENT_LOGS.len()
        );
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_from_config() {
        let config = LoggingConfig::from_config(
            Some("/tmp/test-logs".to_string()),
            false,
            true,
            "debug".to_string(),
        );
        assert_eq!(config.log_dir, PathBuf::from("/tmp/test-logs"));
        assert!(!config.console_output);
        assert!(config.file_logging);
        assert_eq!(config.file_level, Level::DEBUG);

        let config = LoggingConfig::from_config(None, true, false, "bogus".to_string());
        assert_eq!(config.console_level, Level::INFO);
    }

    #[test]
    fn test_env_overrides() {
        let config = LoggingConfig::default().with_overrides(|key| match key {
            "BEACON_LOG_DIR" => Some("/var/log/beacon".to_string()),
            "BEACON_LOG_LEVEL" => Some("warn".to_string()),
            "BEACON_LOG_CONSOLE" => Some("0".to_string()),
            "BEACON_LOG_FILE" => Some("TRUE".to_string()),
            _ => None,
        });
        assert_eq!(config.log_dir, PathBuf::from("/var/log/beacon"));
        assert_eq!(config.console_level, Level::WARN);
        assert!(!config.console_output);
        assert!(config.file_logging);
    }

    #[test]
    fn test_component_log_definitions() {
        for component in COMPONENT_LOGS {
            assert!(component.file_name.ends_with(".log"));
            assert!(!component.targets.is_empty());
        }
    }
}
