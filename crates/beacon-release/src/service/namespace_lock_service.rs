//! Single-writer admission for namespace edits
//!
//! The lock row is acquired before any item edit and removed once the
//! namespace's items match its latest release again.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info};

use beacon_common::BeaconError;
use beacon_persistence::{ItemInfo, LockInsertOutcome, NamespaceInfo, PersistenceService};

use crate::model::NamespaceLockStatus;

pub struct NamespaceLockService {
    persistence: Arc<dyn PersistenceService>,
    switch_off: bool,
}

impl NamespaceLockService {
    pub fn new(persistence: Arc<dyn PersistenceService>, switch_off: bool) -> Self {
        Self {
            persistence,
            switch_off,
        }
    }

    /// Lock enforcement disabled: acquire and unlock are no-ops
    pub fn is_switch_off(&self) -> bool {
        self.switch_off
    }

    /// Look up a namespace, failing with `NamespaceNotExist`
    pub async fn find_namespace(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
    ) -> anyhow::Result<NamespaceInfo> {
        self.persistence
            .namespace_find(app_id, cluster, namespace)
            .await?
            .ok_or_else(|| {
                BeaconError::NamespaceNotExist(beacon_common::assemble_watch_key(
                    app_id, cluster, namespace,
                ))
                .into()
            })
    }

    /// Take the lock for `operator`, or confirm they already hold it
    pub async fn acquire_lock(
        &self,
        namespace: &NamespaceInfo,
        operator: &str,
    ) -> anyhow::Result<()> {
        if self.switch_off {
            return Ok(());
        }

        if let Some(lock) = self.persistence.lock_find(namespace.id).await? {
            return check_lock(namespace, Some(&lock.locked_by), operator);
        }

        match self.persistence.lock_try_insert(namespace.id, operator).await {
            Ok(LockInsertOutcome::Acquired(_)) => {
                info!(
                    namespace = %namespace.display_key(),
                    operator,
                    "Namespace locked"
                );
                Ok(())
            }
            Ok(LockInsertOutcome::Conflict) => {
                let lock = self.persistence.lock_find(namespace.id).await?;
                check_lock(
                    namespace,
                    lock.as_ref().map(|l| l.locked_by.as_str()),
                    operator,
                )
            }
            Err(e) => {
                error!(namespace = %namespace.display_key(), "try lock error: {}", e);
                Err(e)
            }
        }
    }

    /// Take the lock of the namespace owning `item_id`
    pub async fn acquire_lock_for_item(
        &self,
        item_id: i64,
        operator: &str,
    ) -> anyhow::Result<(ItemInfo, NamespaceInfo)> {
        let item = self
            .persistence
            .item_find_by_id(item_id)
            .await?
            .ok_or(BeaconError::ItemNotExist(item_id))?;
        let namespace = self
            .persistence
            .namespace_find_by_id(item.namespace_id)
            .await?
            .ok_or_else(|| BeaconError::NamespaceNotExist(item.namespace_id.to_string()))?;
        self.acquire_lock(&namespace, operator).await?;
        Ok((item, namespace))
    }

    /// Drop the lock when the items match the latest release again.
    /// Returns whether a lock row was removed.
    pub async fn try_unlock(&self, namespace: &NamespaceInfo) -> anyhow::Result<bool> {
        if self.switch_off {
            return Ok(false);
        }
        if self.is_modified(namespace).await? {
            return Ok(false);
        }
        self.unlock(namespace).await
    }

    /// Remove the lock row unconditionally
    pub async fn unlock(&self, namespace: &NamespaceInfo) -> anyhow::Result<bool> {
        let removed = self.persistence.lock_delete(namespace.id).await?;
        if removed {
            info!(namespace = %namespace.display_key(), "Namespace unlocked");
        }
        Ok(removed)
    }

    /// Whether the namespace's items differ from what its latest release
    /// serves. A branch namespace is compared after overlaying its items on
    /// the parent's latest release.
    pub async fn is_modified(&self, namespace: &NamespaceInfo) -> anyhow::Result<bool> {
        let items = self.persistence.item_find_by_namespace(namespace.id).await?;
        let Some(release) = self
            .persistence
            .release_find_latest_active(
                &namespace.app_id,
                &namespace.cluster_name,
                &namespace.namespace_name,
            )
            .await?
        else {
            return Ok(items.iter().any(ItemInfo::has_key));
        };

        let released = release.configuration_map()?;
        let edited = self.configuration_from_items(namespace, &items).await?;
        Ok(released != edited)
    }

    async fn configuration_from_items(
        &self,
        namespace: &NamespaceInfo,
        items: &[ItemInfo],
    ) -> anyhow::Result<HashMap<String, String>> {
        let mut configuration = HashMap::new();
        if let Some(parent) = self.persistence.namespace_find_parent(namespace).await?
            && let Some(parent_release) = self
                .persistence
                .release_find_latest_active(
                    &parent.app_id,
                    &parent.cluster_name,
                    &parent.namespace_name,
                )
                .await?
        {
            configuration = parent_release.configuration_map()?;
        }
        for item in items.iter().filter(|item| item.has_key()) {
            configuration.insert(item.key.clone(), item.value.clone());
        }
        Ok(configuration)
    }

    pub async fn lock_status(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
    ) -> anyhow::Result<NamespaceLockStatus> {
        let info = self.find_namespace(app_id, cluster, namespace).await?;
        let status = match self.persistence.lock_find(info.id).await? {
            Some(lock) => NamespaceLockStatus::locked(namespace, &lock.locked_by),
            None => NamespaceLockStatus::unlocked(namespace),
        };
        Ok(status)
    }
}

fn check_lock(
    namespace: &NamespaceInfo,
    lock_owner: Option<&str>,
    operator: &str,
) -> anyhow::Result<()> {
    match lock_owner {
        None => Err(BeaconError::LockCheckFailed(namespace.namespace_name.clone()).into()),
        Some(owner) if owner == operator => Ok(()),
        Some(owner) => Err(BeaconError::NamespaceLocked {
            namespace: namespace.namespace_name.clone(),
            owner: owner.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_persistence::{
        ItemPersistence, MemoryPersistService, NamespaceLockPersistence, NamespacePersistence,
        NewItem, NewRelease, ReleasePersistence,
    };

    async fn setup() -> (Arc<MemoryPersistService>, NamespaceInfo) {
        let store = Arc::new(MemoryPersistService::new());
        store
            .cluster_create("app1", "default", 0, "alice")
            .await
            .unwrap();
        let namespace = store
            .namespace_create("app1", "default", "application", "alice")
            .await
            .unwrap();
        (store, namespace)
    }

    fn item(key: &str, value: &str) -> NewItem {
        NewItem {
            key: key.to_string(),
            value: value.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_acquire_is_idempotent_for_owner() {
        let (store, namespace) = setup().await;
        let service = NamespaceLockService::new(store.clone(), false);

        service.acquire_lock(&namespace, "alice").await.unwrap();
        service.acquire_lock(&namespace, "alice").await.unwrap();

        let err = service.acquire_lock(&namespace, "bob").await.unwrap_err();
        match err.downcast_ref::<BeaconError>() {
            Some(BeaconError::NamespaceLocked { owner, .. }) => assert_eq!(owner, "alice"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_single_winner() {
        let (store, namespace) = setup().await;
        let service = Arc::new(NamespaceLockService::new(store.clone(), false));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = service.clone();
                let namespace = namespace.clone();
                tokio::spawn(async move {
                    let owner = format!("user-{i}");
                    (owner.clone(), service.acquire_lock(&namespace, &owner).await)
                })
            })
            .collect();

        let mut winners = Vec::new();
        for handle in handles {
            let (owner, result) = handle.await.unwrap();
            match result {
                Ok(()) => winners.push(owner),
                Err(e) => assert!(matches!(
                    e.downcast_ref::<BeaconError>(),
                    Some(BeaconError::NamespaceLocked { .. } | BeaconError::LockCheckFailed(_))
                )),
            }
        }
        assert_eq!(winners.len(), 1);
        let lock = store.lock_find(namespace.id).await.unwrap().unwrap();
        assert_eq!(lock.locked_by, winners[0]);
    }

    #[tokio::test]
    async fn test_try_unlock_without_lock_is_noop() {
        let (store, namespace) = setup().await;
        let service = NamespaceLockService::new(store, false);
        assert!(!service.try_unlock(&namespace).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlock_when_items_match_release() {
        let (store, namespace) = setup().await;
        let service = NamespaceLockService::new(store.clone(), false);

        service.acquire_lock(&namespace, "alice").await.unwrap();
        let created = store
            .item_create(namespace.id, item("k", "v"), "alice")
            .await
            .unwrap();
        assert!(service.is_modified(&namespace).await.unwrap());
        assert!(!service.try_unlock(&namespace).await.unwrap());

        store.item_delete(created.id, "alice").await.unwrap();
        assert!(!service.is_modified(&namespace).await.unwrap());
        assert!(service.try_unlock(&namespace).await.unwrap());
        assert!(store.lock_find(namespace.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_branch_compared_against_parent_overlay() {
        let (store, parent) = setup().await;
        let root = store.cluster_find("app1", "default").await.unwrap().unwrap();
        store
            .cluster_create("app1", "gray", root.id, "alice")
            .await
            .unwrap();
        let branch = store
            .namespace_create("app1", "gray", "application", "alice")
            .await
            .unwrap();

        let release = |cluster: &str, configurations: &str| NewRelease {
            release_key: format!("key-{cluster}"),
            name: "r".to_string(),
            app_id: "app1".to_string(),
            cluster_name: cluster.to_string(),
            namespace_name: "application".to_string(),
            configurations: configurations.to_string(),
            operator: "alice".to_string(),
            ..Default::default()
        };
        store
            .release_publish(
                release("default", r#"{"a":"1","b":"2"}"#),
                &parent.display_key(),
            )
            .await
            .unwrap();
        store
            .release_publish(
                release("gray", r#"{"a":"1","b":"3"}"#),
                &parent.display_key(),
            )
            .await
            .unwrap();

        let service = NamespaceLockService::new(store.clone(), false);
        store
            .item_create(branch.id, item("b", "3"), "alice")
            .await
            .unwrap();
        assert!(!service.is_modified(&branch).await.unwrap());

        store
            .item_create(branch.id, item("c", "4"), "alice")
            .await
            .unwrap();
        assert!(service.is_modified(&branch).await.unwrap());
    }

    #[tokio::test]
    async fn test_switch_off_disables_lock() {
        let (store, namespace) = setup().await;
        let service = NamespaceLockService::new(store.clone(), true);
        service.acquire_lock(&namespace, "alice").await.unwrap();
        service.acquire_lock(&namespace, "bob").await.unwrap();
        assert!(store.lock_find(namespace.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lock_status() {
        let (store, namespace) = setup().await;
        let service = NamespaceLockService::new(store, false);
        let status = service
            .lock_status("app1", "default", "application")
            .await
            .unwrap();
        assert!(!status.is_locked);

        service.acquire_lock(&namespace, "alice").await.unwrap();
        let status = service
            .lock_status("app1", "default", "application")
            .await
            .unwrap();
        assert_eq!(status.locked_by.as_deref(), Some("alice"));

        let err = service
            .lock_status("app1", "default", "missing")
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<BeaconError>().unwrap().is_not_found());
    }
}
