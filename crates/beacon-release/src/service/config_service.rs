//! Release resolution
//!
//! A client asking for `(appId, cluster, namespace)` is served, in order, from
//! the named cluster (when not the default one), its data center used as a
//! cluster name (when set and different), and finally the default cluster.
//! Within each tier a matching gray rule wins over the latest release.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use beacon_common::assemble_watch_key;
use beacon_common::constants::DEFAULT_CLUSTER_NAME;
use beacon_persistence::{PersistenceService, ReleaseInfo};

use crate::gray::GrayReleaseRulesHolder;
use crate::model::{ClientIdentity, NotificationMessages};

/// Resolves which release a client should see
#[async_trait]
pub trait ConfigService: Send + Sync {
    fn gray_release_rules(&self) -> &GrayReleaseRulesHolder;

    /// Active release by id
    async fn find_active_release(
        &self,
        id: i64,
        client_messages: Option<&NotificationMessages>,
    ) -> anyhow::Result<Option<ReleaseInfo>>;

    /// Newest active release of a namespace
    async fn find_latest_active_release(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        client_messages: Option<&NotificationMessages>,
    ) -> anyhow::Result<Option<ReleaseInfo>>;

    /// Walk the cluster fallback tiers
    async fn load_config(
        &self,
        client: &ClientIdentity,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        client_messages: Option<&NotificationMessages>,
    ) -> anyhow::Result<Option<ReleaseInfo>> {
        if cluster != DEFAULT_CLUSTER_NAME
            && let Some(release) = self
                .find_release(client, app_id, cluster, namespace, client_messages)
                .await?
        {
            return Ok(Some(release));
        }

        if let Some(dc) = client.data_center()
            && dc != cluster
            && let Some(release) = self
                .find_release(client, app_id, dc, namespace, client_messages)
                .await?
        {
            return Ok(Some(release));
        }

        self.find_release(client, app_id, DEFAULT_CLUSTER_NAME, namespace, client_messages)
            .await
    }

    /// Resolve within one cluster: gray release first, then latest
    async fn find_release(
        &self,
        client: &ClientIdentity,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        client_messages: Option<&NotificationMessages>,
    ) -> anyhow::Result<Option<ReleaseInfo>> {
        let gray_release_id = self.gray_release_rules().find_release_id_from_gray_release_rule(
            &client.app_id,
            client.ip(),
            app_id,
            cluster,
            namespace,
        );

        if let Some(id) = gray_release_id
            && let Some(release) = self.find_active_release(id, client_messages).await?
        {
            debug!(
                release_id = id,
                key = %assemble_watch_key(app_id, cluster, namespace),
                "Serving gray release"
            );
            return Ok(Some(release));
        }

        self.find_latest_active_release(app_id, cluster, namespace, client_messages)
            .await
    }
}

/// Reads straight from the store on every call
pub struct DefaultConfigService {
    persistence: Arc<dyn PersistenceService>,
    gray_release_rules: Arc<GrayReleaseRulesHolder>,
}

impl DefaultConfigService {
    pub fn new(
        persistence: Arc<dyn PersistenceService>,
        gray_release_rules: Arc<GrayReleaseRulesHolder>,
    ) -> Self {
        Self {
            persistence,
            gray_release_rules,
        }
    }
}

#[async_trait]
impl ConfigService for DefaultConfigService {
    fn gray_release_rules(&self) -> &GrayReleaseRulesHolder {
        &self.gray_release_rules
    }

    async fn find_active_release(
        &self,
        id: i64,
        _client_messages: Option<&NotificationMessages>,
    ) -> anyhow::Result<Option<ReleaseInfo>> {
        self.persistence.release_find_active_by_id(id).await
    }

    async fn find_latest_active_release(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        _client_messages: Option<&NotificationMessages>,
    ) -> anyhow::Result<Option<ReleaseInfo>> {
        self.persistence
            .release_find_latest_active(app_id, cluster, namespace)
            .await
    }
}
