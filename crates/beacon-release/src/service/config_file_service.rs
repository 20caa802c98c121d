//! Rendered configuration files
//!
//! Serves a namespace's resolved configuration as a JSON object, caching the
//! rendering per `(appId, cluster, namespace, dataCenter)`. Clients targeted
//! by a gray rule bypass the cache. A change log message for any watch key
//! that fed an entry drops that entry.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;
use tracing::debug;

use beacon_common::constants::{CLUSTER_NAMESPACE_SEPARATOR, RELEASE_MESSAGE_TOPIC};
use beacon_common::utils::normalize_namespace;
use beacon_common::watch_key::assemble_all_watch_keys;
use beacon_persistence::ReleaseMessageInfo;

use super::ConfigService;
use crate::message::ReleaseMessageListener;
use crate::model::ClientIdentity;

const JSON_FORMAT: &str = "json";

pub struct ConfigFileService {
    config_service: Arc<dyn ConfigService>,
    local_cache: Cache<String, String>,
    watched_keys_to_cache_keys: DashMap<String, BTreeSet<String>>,
}

impl ConfigFileService {
    pub fn new(
        config_service: Arc<dyn ConfigService>,
        time_to_live: Duration,
        max_capacity: u64,
    ) -> Self {
        Self {
            config_service,
            local_cache: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(time_to_live)
                .build(),
            watched_keys_to_cache_keys: DashMap::new(),
        }
    }

    /// Resolved configuration as a JSON object, `None` when nothing is
    /// published for any fallback tier
    pub async fn query_config_as_json(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        client: &ClientIdentity,
    ) -> anyhow::Result<Option<String>> {
        let namespace = normalize_namespace(namespace);

        if let Some(ip) = client.ip()
            && self
                .config_service
                .gray_release_rules()
                .has_gray_release_rule(&client.app_id, Some(ip), namespace)
        {
            return self.render(app_id, cluster, namespace, client).await;
        }

        let cache_key = [
            JSON_FORMAT,
            app_id,
            cluster,
            namespace,
            client.data_center().unwrap_or_default(),
        ]
        .join(CLUSTER_NAMESPACE_SEPARATOR);

        if let Some(cached) = self.local_cache.get(&cache_key).await {
            return Ok(Some(cached));
        }

        let Some(rendered) = self.render(app_id, cluster, namespace, client).await? else {
            return Ok(None);
        };

        self.local_cache
            .insert(cache_key.clone(), rendered.clone())
            .await;
        for watch_key in assemble_all_watch_keys(app_id, cluster, namespace, client.data_center())
        {
            self.watched_keys_to_cache_keys
                .entry(watch_key)
                .or_default()
                .insert(cache_key.clone());
        }
        debug!(cache_key, "Config file cached");
        Ok(Some(rendered))
    }

    async fn render(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        client: &ClientIdentity,
    ) -> anyhow::Result<Option<String>> {
        let Some(release) = self
            .config_service
            .load_config(client, app_id, cluster, namespace, None)
            .await?
        else {
            return Ok(None);
        };
        let configurations = release.configuration_map()?;
        Ok(Some(serde_json::to_string(&configurations)?))
    }
}

#[async_trait]
impl ReleaseMessageListener for ConfigFileService {
    fn name(&self) -> &'static str {
        "config-file-service"
    }

    async fn handle_message(
        &self,
        message: &ReleaseMessageInfo,
        channel: &str,
    ) -> anyhow::Result<()> {
        if channel != RELEASE_MESSAGE_TOPIC || message.message.is_empty() {
            return Ok(());
        }
        let Some((_, cache_keys)) = self.watched_keys_to_cache_keys.remove(&message.message) else {
            return Ok(());
        };
        for cache_key in cache_keys {
            self.local_cache.invalidate(&cache_key).await;
            debug!(cache_key, "Config file cache invalidated");
        }
        Ok(())
    }
}
