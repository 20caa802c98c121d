//! Release resolution backed by in-process caches

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::{debug, warn};

use beacon_common::constants::{NOTIFICATION_ID_PLACEHOLDER, RELEASE_MESSAGE_TOPIC};
use beacon_common::{WatchKey, assemble_watch_key};
use beacon_persistence::{PersistenceService, ReleaseInfo, ReleaseMessageInfo};

use super::ConfigService;
use crate::gray::GrayReleaseRulesHolder;
use crate::message::ReleaseMessageListener;
use crate::model::NotificationMessages;

/// Cached resolution result of one watch key
#[derive(Debug, Clone)]
struct ConfigCacheEntry {
    notification_id: i64,
    release: Option<ReleaseInfo>,
}

impl ConfigCacheEntry {
    fn absent() -> Self {
        Self {
            notification_id: NOTIFICATION_ID_PLACEHOLDER,
            release: None,
        }
    }
}

/// Caches latest releases per watch key and releases per id.
///
/// Entries carry the id of the newest change log row seen for their key. A
/// client hint with a larger id, or a change log message for the key, forces
/// a reload. Store errors are returned to the caller and never cached.
pub struct CachedConfigService {
    persistence: Arc<dyn PersistenceService>,
    gray_release_rules: Arc<GrayReleaseRulesHolder>,
    config_cache: Cache<String, ConfigCacheEntry>,
    config_id_cache: Cache<i64, Option<ReleaseInfo>>,
}

impl CachedConfigService {
    pub fn new(
        persistence: Arc<dyn PersistenceService>,
        gray_release_rules: Arc<GrayReleaseRulesHolder>,
        time_to_idle: Duration,
        max_capacity: u64,
    ) -> Self {
        Self {
            persistence,
            gray_release_rules,
            config_cache: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_idle(time_to_idle)
                .build(),
            config_id_cache: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_idle(time_to_idle)
                .support_invalidation_closures()
                .build(),
        }
    }

    async fn load_entry(&self, key: &str) -> anyhow::Result<ConfigCacheEntry> {
        let Some(watch_key) = WatchKey::parse(key) else {
            warn!(key, "Invalid watch key, caching negative entry");
            return Ok(ConfigCacheEntry::absent());
        };
        // change log first: a publish landing in between yields a newer
        // release under an older id, which the next hint reloads
        let latest_message = self
            .persistence
            .message_find_latest_by_messages(&[key.to_string()])
            .await?;
        let release = self
            .persistence
            .release_find_latest_active(&watch_key.app_id, &watch_key.cluster, &watch_key.namespace)
            .await?;
        let notification_id = latest_message
            .map(|m| m.id)
            .unwrap_or(NOTIFICATION_ID_PLACEHOLDER);

        Ok(ConfigCacheEntry {
            notification_id,
            release,
        })
    }

    async fn get_entry(&self, key: &str) -> anyhow::Result<ConfigCacheEntry> {
        self.config_cache
            .try_get_with(key.to_string(), self.load_entry(key))
            .await
            .map_err(|e| anyhow::anyhow!("load config cache entry for {} failed: {}", key, e))
    }

    async fn invalidate(&self, key: &str) {
        self.config_cache.invalidate(key).await;
    }

    /// Drop releases by id of the key's namespace, branch releases included,
    /// so abandoned ones stop being served
    fn invalidate_releases(&self, watch_key: WatchKey) {
        let result = self.config_id_cache.invalidate_entries_if(move |_, release| {
            release.as_ref().is_some_and(|r| {
                r.app_id == watch_key.app_id && r.namespace_name == watch_key.namespace
            })
        });
        if let Err(e) = result {
            warn!("Invalidate cached releases failed: {}", e);
        }
    }

    #[cfg(test)]
    async fn cached_notification_id(&self, key: &str) -> Option<i64> {
        self.config_cache.get(key).await.map(|e| e.notification_id)
    }
}

#[async_trait]
impl ConfigService for CachedConfigService {
    fn gray_release_rules(&self) -> &GrayReleaseRulesHolder {
        &self.gray_release_rules
    }

    async fn find_active_release(
        &self,
        id: i64,
        _client_messages: Option<&NotificationMessages>,
    ) -> anyhow::Result<Option<ReleaseInfo>> {
        let persistence = self.persistence.clone();
        self.config_id_cache
            .try_get_with(id, async move { persistence.release_find_active_by_id(id).await })
            .await
            .map_err(|e| anyhow::anyhow!("load release {} failed: {}", id, e))
    }

    async fn find_latest_active_release(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        client_messages: Option<&NotificationMessages>,
    ) -> anyhow::Result<Option<ReleaseInfo>> {
        let key = assemble_watch_key(app_id, cluster, namespace);
        let client_notification_id = client_messages
            .and_then(|m| m.get(&key))
            .unwrap_or(NOTIFICATION_ID_PLACEHOLDER);

        let mut entry = self.get_entry(&key).await?;
        if client_notification_id > entry.notification_id {
            debug!(
                key,
                cached = entry.notification_id,
                client = client_notification_id,
                "Client notification newer than cache, reloading"
            );
            self.invalidate(&key).await;
            entry = self.get_entry(&key).await?;
        }
        Ok(entry.release)
    }
}

#[async_trait]
impl ReleaseMessageListener for CachedConfigService {
    fn name(&self) -> &'static str {
        "config-service-cache"
    }

    async fn handle_message(
        &self,
        message: &ReleaseMessageInfo,
        channel: &str,
    ) -> anyhow::Result<()> {
        if channel != RELEASE_MESSAGE_TOPIC || message.message.is_empty() {
            return Ok(());
        }
        let key = &message.message;
        if let Some(watch_key) = WatchKey::parse(key) {
            self.invalidate_releases(watch_key);
        }
        self.invalidate(key).await;
        if let Err(e) = self.get_entry(key).await {
            warn!(key, "Reload config cache entry failed: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_persistence::{MemoryPersistService, NewRelease, ReleasePersistence};

    const KEY: &str = "app1+default+application";

    fn new_release(value: &str) -> NewRelease {
        NewRelease {
            release_key: format!("key-{value}"),
            name: "r".to_string(),
            app_id: "app1".to_string(),
            cluster_name: "default".to_string(),
            namespace_name: "application".to_string(),
            configurations: format!(r#"{{"k":"{value}"}}"#),
            operator: "alice".to_string(),
            ..Default::default()
        }
    }

    fn service(store: Arc<MemoryPersistService>) -> CachedConfigService {
        let holder = Arc::new(GrayReleaseRulesHolder::new(
            store.clone(),
            Duration::from_secs(60),
            500,
        ));
        CachedConfigService::new(store, holder, Duration::from_secs(3600), 100)
    }

    async fn latest(
        service: &CachedConfigService,
        messages: Option<&NotificationMessages>,
    ) -> Option<i64> {
        service
            .find_latest_active_release("app1", "default", "application", messages)
            .await
            .unwrap()
            .map(|r| r.id)
    }

    #[tokio::test]
    async fn test_client_hint_forces_reload() {
        let store = Arc::new(MemoryPersistService::new());
        let (first, _) = store.release_publish(new_release("v1"), KEY).await.unwrap();
        let service = service(store.clone());
        assert_eq!(latest(&service, None).await, Some(first.id));

        let (second, message) = store.release_publish(new_release("v2"), KEY).await.unwrap();
        // without a hint the stale entry is still served
        assert_eq!(latest(&service, None).await, Some(first.id));

        let mut hint = NotificationMessages::new();
        hint.add(KEY.to_string(), message.id);
        assert_eq!(latest(&service, Some(&hint)).await, Some(second.id));
        assert_eq!(service.cached_notification_id(KEY).await, Some(message.id));
    }

    #[tokio::test]
    async fn test_negative_entry_cached() {
        let store = Arc::new(MemoryPersistService::new());
        let service = service(store.clone());
        assert_eq!(latest(&service, None).await, None);
        assert_eq!(
            service.cached_notification_id(KEY).await,
            Some(NOTIFICATION_ID_PLACEHOLDER)
        );
    }

    #[tokio::test]
    async fn test_entry_reads_change_log_before_release() {
        let store = Arc::new(MemoryPersistService::new());
        let service = service(store.clone());
        store.record_reads();

        service.get_entry(KEY).await.unwrap();
        assert_eq!(
            store.take_reads(),
            vec!["message_find_latest_by_messages", "release_find_latest_active"]
        );
    }

    #[tokio::test]
    async fn test_malformed_key_skips_store() {
        let store = Arc::new(MemoryPersistService::new());
        let service = service(store.clone());
        store.set_unavailable(true);

        let entry = service.get_entry("not-a-watch-key").await.unwrap();
        assert!(entry.release.is_none());
        assert_eq!(entry.notification_id, NOTIFICATION_ID_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_message_reloads_eagerly() {
        let store = Arc::new(MemoryPersistService::new());
        let service = service(store.clone());
        assert_eq!(latest(&service, None).await, None);

        let (release, message) = store.release_publish(new_release("v1"), KEY).await.unwrap();
        service
            .handle_message(&message, RELEASE_MESSAGE_TOPIC)
            .await
            .unwrap();
        assert_eq!(service.cached_notification_id(KEY).await, Some(message.id));
        assert_eq!(latest(&service, None).await, Some(release.id));
    }

    #[tokio::test]
    async fn test_abandoned_release_dropped_on_message() {
        let store = Arc::new(MemoryPersistService::new());
        let (release, _) = store.release_publish(new_release("v1"), KEY).await.unwrap();
        let service = service(store.clone());
        assert!(service.find_active_release(release.id, None).await.unwrap().is_some());

        let message = store.release_abandon(&[release.id], "alice", KEY).await.unwrap();
        assert!(service.find_active_release(release.id, None).await.unwrap().is_some());

        service
            .handle_message(&message, RELEASE_MESSAGE_TOPIC)
            .await
            .unwrap();
        assert!(service.find_active_release(release.id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_error_not_cached() {
        let store = Arc::new(MemoryPersistService::new());
        let (release, _) = store.release_publish(new_release("v1"), KEY).await.unwrap();
        let service = service(store.clone());

        store.set_unavailable(true);
        assert!(
            service
                .find_latest_active_release("app1", "default", "application", None)
                .await
                .is_err()
        );
        assert!(service.find_active_release(release.id, None).await.is_err());

        store.set_unavailable(false);
        assert_eq!(latest(&service, None).await, Some(release.id));
        assert_eq!(
            service
                .find_active_release(release.id, None)
                .await
                .unwrap()
                .map(|r| r.id),
            Some(release.id)
        );
    }
}
