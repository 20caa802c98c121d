//! Release engine bootstrap
//!
//! Builds every component once, registers the change log listeners in a
//! fixed order and owns the background tasks.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use beacon_persistence::PersistenceService;

use crate::config::ReleaseEngineConfig;
use crate::gray::GrayReleaseRulesHolder;
use crate::message::{DatabaseMessageSender, ReleaseMessageCache, ReleaseMessageScanner};
use crate::service::{
    BranchService, CachedConfigService, ConfigFileService, ConfigService, DefaultConfigService,
    ItemService, NamespaceLockService, NotificationService, ReleaseService,
};

pub struct ReleaseEngine {
    config: ReleaseEngineConfig,
    persistence: Arc<dyn PersistenceService>,
    message_sender: Arc<DatabaseMessageSender>,
    message_scanner: Arc<ReleaseMessageScanner>,
    release_message_cache: Arc<ReleaseMessageCache>,
    gray_release_rules: Arc<GrayReleaseRulesHolder>,
    config_service: Arc<dyn ConfigService>,
    config_file_service: Arc<ConfigFileService>,
    notification_service: Arc<NotificationService>,
    lock_service: Arc<NamespaceLockService>,
    item_service: Arc<ItemService>,
    release_service: Arc<ReleaseService>,
    branch_service: Arc<BranchService>,
}

impl ReleaseEngine {
    pub fn new(persistence: Arc<dyn PersistenceService>, config: ReleaseEngineConfig) -> Self {
        let message_sender = Arc::new(DatabaseMessageSender::new(
            persistence.clone(),
            config.release_message_clean_queue_size,
            config.release_message_clean_batch_size,
        ));
        let message_scanner = Arc::new(ReleaseMessageScanner::new(
            persistence.clone(),
            config.release_message_scan_interval,
            config.release_message_scan_batch_size,
        ));
        let release_message_cache = Arc::new(ReleaseMessageCache::new(
            persistence.clone(),
            config.release_message_cache_scan_interval,
            config.release_message_scan_batch_size,
        ));
        let gray_release_rules = Arc::new(GrayReleaseRulesHolder::new(
            persistence.clone(),
            config.gray_rule_scan_interval,
            config.gray_rule_scan_batch_size,
        ));
        message_scanner.add_message_listener(gray_release_rules.clone());

        let config_service: Arc<dyn ConfigService> = if config.config_cache_enabled {
            let cached = Arc::new(CachedConfigService::new(
                persistence.clone(),
                gray_release_rules.clone(),
                config.config_cache_ttl,
                config.config_cache_max_capacity,
            ));
            message_scanner.add_message_listener(cached.clone());
            cached
        } else {
            Arc::new(DefaultConfigService::new(
                persistence.clone(),
                gray_release_rules.clone(),
            ))
        };
        message_scanner.add_message_listener(release_message_cache.clone());

        let notification_service = Arc::new(NotificationService::new(
            release_message_cache.clone(),
            config.long_polling_timeout,
        ));
        message_scanner.add_message_listener(notification_service.clone());

        let config_file_service = Arc::new(ConfigFileService::new(
            config_service.clone(),
            config.config_cache_ttl,
            config.config_cache_max_capacity,
        ));
        message_scanner.add_message_listener(config_file_service.clone());

        let lock_service = Arc::new(NamespaceLockService::new(
            persistence.clone(),
            config.namespace_lock_switch_off,
        ));
        let item_service = Arc::new(ItemService::new(persistence.clone(), lock_service.clone()));
        let release_service = Arc::new(ReleaseService::new(
            persistence.clone(),
            lock_service.clone(),
            message_sender.clone(),
        ));
        let branch_service = Arc::new(BranchService::new(
            persistence.clone(),
            message_sender.clone(),
        ));

        Self {
            config,
            persistence,
            message_sender,
            message_scanner,
            release_message_cache,
            gray_release_rules,
            config_service,
            config_file_service,
            notification_service,
            lock_service,
            item_service,
            release_service,
            branch_service,
        }
    }

    /// Build and load the in-process state from the store
    pub async fn bootstrap(
        persistence: Arc<dyn PersistenceService>,
        config: ReleaseEngineConfig,
    ) -> anyhow::Result<Self> {
        let engine = Self::new(persistence, config);
        engine.initialize().await?;
        Ok(engine)
    }

    /// Position the scanner watermark, run the first gray rule scan and
    /// load the release message cache
    pub async fn initialize(&self) -> anyhow::Result<()> {
        self.message_scanner.initialize().await?;
        self.gray_release_rules.initialize().await?;
        self.release_message_cache.initialize().await?;
        info!(
            storage_mode = %self.persistence.storage_mode(),
            listeners = self.message_scanner.listener_count(),
            config_cache_enabled = self.config.config_cache_enabled,
            namespace_lock_switch_off = self.config.namespace_lock_switch_off,
            "Release engine initialized"
        );
        Ok(())
    }

    /// Spawn the background loops; each stops on the shutdown broadcast
    pub fn start(&self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let mut handles = vec![
            self.message_scanner.clone().start(shutdown.subscribe()),
            self.gray_release_rules.clone().start(shutdown.subscribe()),
            self.release_message_cache.clone().start(shutdown.subscribe()),
        ];
        if let Some(handle) = self.message_sender.clone().start(shutdown.subscribe()) {
            handles.push(handle);
        }
        info!(tasks = handles.len(), "Release engine started");
        handles
    }

    pub fn config(&self) -> &ReleaseEngineConfig {
        &self.config
    }

    pub fn persistence(&self) -> Arc<dyn PersistenceService> {
        self.persistence.clone()
    }

    pub fn message_sender(&self) -> Arc<DatabaseMessageSender> {
        self.message_sender.clone()
    }

    pub fn message_scanner(&self) -> Arc<ReleaseMessageScanner> {
        self.message_scanner.clone()
    }

    pub fn release_message_cache(&self) -> Arc<ReleaseMessageCache> {
        self.release_message_cache.clone()
    }

    pub fn gray_release_rules(&self) -> Arc<GrayReleaseRulesHolder> {
        self.gray_release_rules.clone()
    }

    pub fn config_service(&self) -> Arc<dyn ConfigService> {
        self.config_service.clone()
    }

    pub fn config_file_service(&self) -> Arc<ConfigFileService> {
        self.config_file_service.clone()
    }

    pub fn notification_service(&self) -> Arc<NotificationService> {
        self.notification_service.clone()
    }

    pub fn lock_service(&self) -> Arc<NamespaceLockService> {
        self.lock_service.clone()
    }

    pub fn item_service(&self) -> Arc<ItemService> {
        self.item_service.clone()
    }

    pub fn release_service(&self) -> Arc<ReleaseService> {
        self.release_service.clone()
    }

    pub fn branch_service(&self) -> Arc<BranchService> {
        self.branch_service.clone()
    }
}
