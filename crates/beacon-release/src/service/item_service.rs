//! Item edits gated by the namespace lock
//!
//! Every edit acquires the namespace lock first and afterwards attempts the
//! computed unlock, whether or not the edit itself succeeded.

use std::sync::Arc;

use tracing::warn;

use beacon_common::BeaconError;
use beacon_persistence::{ItemInfo, NamespaceInfo, NewItem, PersistenceService};

use super::NamespaceLockService;

pub struct ItemService {
    persistence: Arc<dyn PersistenceService>,
    lock_service: Arc<NamespaceLockService>,
}

impl ItemService {
    pub fn new(
        persistence: Arc<dyn PersistenceService>,
        lock_service: Arc<NamespaceLockService>,
    ) -> Self {
        Self {
            persistence,
            lock_service,
        }
    }

    pub async fn find_items(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
    ) -> anyhow::Result<Vec<ItemInfo>> {
        let info = self
            .lock_service
            .find_namespace(app_id, cluster, namespace)
            .await?;
        self.persistence.item_find_by_namespace(info.id).await
    }

    pub async fn create_item(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        item: NewItem,
        operator: &str,
    ) -> anyhow::Result<ItemInfo> {
        let info = self
            .lock_service
            .find_namespace(app_id, cluster, namespace)
            .await?;
        self.lock_service.acquire_lock(&info, operator).await?;

        let result = self.do_create_item(&info, item, operator).await;
        self.after_edit(&info).await;
        result
    }

    async fn do_create_item(
        &self,
        namespace: &NamespaceInfo,
        item: NewItem,
        operator: &str,
    ) -> anyhow::Result<ItemInfo> {
        let key = item.key.trim();
        if !key.is_empty()
            && self
                .persistence
                .item_find_by_key(namespace.id, key)
                .await?
                .is_some()
        {
            return Err(BeaconError::IllegalArgument(format!("item already exists: {}", key)).into());
        }
        let item = NewItem {
            key: key.to_string(),
            ..item
        };
        self.persistence
            .item_create(namespace.id, item, operator)
            .await
    }

    pub async fn update_item(
        &self,
        item_id: i64,
        value: &str,
        comment: &str,
        operator: &str,
    ) -> anyhow::Result<ItemInfo> {
        let (_, namespace) = self
            .lock_service
            .acquire_lock_for_item(item_id, operator)
            .await?;

        let result = self
            .persistence
            .item_update(item_id, value, comment, operator)
            .await
            .and_then(|updated| updated.ok_or_else(|| BeaconError::ItemNotExist(item_id).into()));
        self.after_edit(&namespace).await;
        result
    }

    pub async fn delete_item(&self, item_id: i64, operator: &str) -> anyhow::Result<()> {
        let (_, namespace) = self
            .lock_service
            .acquire_lock_for_item(item_id, operator)
            .await?;

        let result = match self.persistence.item_delete(item_id, operator).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(BeaconError::ItemNotExist(item_id).into()),
            Err(e) => Err(e),
        };
        self.after_edit(&namespace).await;
        result
    }

    async fn after_edit(&self, namespace: &NamespaceInfo) {
        if let Err(e) = self.lock_service.try_unlock(namespace).await {
            warn!(namespace = %namespace.display_key(), "Try unlock failed: {}", e);
        }
    }
}
