//! Publishing and rolling back releases

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use beacon_common::utils::generate_release_key;
use beacon_common::{BeaconError, assemble_watch_key};
use beacon_persistence::{ItemInfo, NamespaceInfo, NewRelease, PersistenceService, ReleaseInfo};

use super::NamespaceLockService;
use crate::message::DatabaseMessageSender;

/// Comment of branch releases refreshed after a parent publish
const MERGE_FROM_MASTER_COMMENT: &str = "Auto merged from parent release";
/// Comment of branch releases refreshed after a parent rollback
const MASTER_ROLLBACK_COMMENT: &str = "Parent release rolled back";

pub struct ReleaseService {
    persistence: Arc<dyn PersistenceService>,
    lock_service: Arc<NamespaceLockService>,
    message_sender: Arc<DatabaseMessageSender>,
}

impl ReleaseService {
    pub fn new(
        persistence: Arc<dyn PersistenceService>,
        lock_service: Arc<NamespaceLockService>,
        message_sender: Arc<DatabaseMessageSender>,
    ) -> Self {
        Self {
            persistence,
            lock_service,
            message_sender,
        }
    }

    pub async fn find_latest_active(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
    ) -> anyhow::Result<Option<ReleaseInfo>> {
        self.persistence
            .release_find_latest_active(app_id, cluster, namespace)
            .await
    }

    /// Snapshot the namespace's items into a new release.
    ///
    /// A branch namespace is released as its parent's latest configuration
    /// overlaid with the branch items, under the parent's watch key. A parent
    /// publish refreshes every published branch on top of the new release.
    #[allow(clippy::too_many_arguments)]
    pub async fn publish(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        name: &str,
        comment: &str,
        operator: &str,
        is_emergency_publish: bool,
    ) -> anyhow::Result<ReleaseInfo> {
        let info = self
            .lock_service
            .find_namespace(app_id, cluster, namespace)
            .await?;
        self.check_lock(&info, is_emergency_publish, operator)
            .await?;

        let items = self.persistence.item_find_by_namespace(info.id).await?;
        let configurations = configuration_from_items(&items);

        let release = match self.persistence.namespace_find_parent(&info).await? {
            Some(parent) => {
                self.publish_branch(&parent, &info, configurations, name, comment, operator)
                    .await?
            }
            None => {
                let release = self
                    .master_release(&info, &configurations, name, comment, operator)
                    .await?;
                self.merge_from_master_and_publish_branches(
                    &info,
                    &release,
                    MERGE_FROM_MASTER_COMMENT,
                    operator,
                )
                .await?;
                release
            }
        };

        self.lock_service.unlock(&info).await?;
        Ok(release)
    }

    async fn check_lock(
        &self,
        namespace: &NamespaceInfo,
        is_emergency_publish: bool,
        operator: &str,
    ) -> anyhow::Result<()> {
        if is_emergency_publish || self.lock_service.is_switch_off() {
            return Ok(());
        }
        match self.persistence.lock_find(namespace.id).await? {
            Some(lock) if lock.locked_by == operator => Err(BeaconError::IllegalArgument(
                "config can not be published by yourself".to_string(),
            )
            .into()),
            _ => Ok(()),
        }
    }

    async fn master_release(
        &self,
        namespace: &NamespaceInfo,
        configurations: &HashMap<String, String>,
        name: &str,
        comment: &str,
        operator: &str,
    ) -> anyhow::Result<ReleaseInfo> {
        let new = new_release(namespace, configurations, name, comment, operator)?;
        let (release, message) = self
            .persistence
            .release_publish(new, &namespace.display_key())
            .await?;
        self.message_sender.schedule_clean(message.id);

        info!(
            release_id = release.id,
            release_key = %release.release_key,
            namespace = %namespace.display_key(),
            operator,
            "Release published"
        );
        Ok(release)
    }

    async fn publish_branch(
        &self,
        parent: &NamespaceInfo,
        branch: &NamespaceInfo,
        branch_configurations: HashMap<String, String>,
        name: &str,
        comment: &str,
        operator: &str,
    ) -> anyhow::Result<ReleaseInfo> {
        let mut configurations = match self
            .find_latest_active(&parent.app_id, &parent.cluster_name, &parent.namespace_name)
            .await?
        {
            Some(parent_release) => parent_release.configuration_map()?,
            None => HashMap::new(),
        };
        configurations.extend(branch_configurations);

        let new = new_release(branch, &configurations, name, comment, operator)?;
        let (release, rule, message) = self
            .persistence
            .release_publish_branch(new, &parent.cluster_name, &parent.display_key())
            .await?;
        self.message_sender.schedule_clean(message.id);

        info!(
            release_id = release.id,
            branch = %branch.cluster_name,
            namespace = %parent.display_key(),
            rule_id = rule.map(|r| r.id),
            operator,
            "Branch release published"
        );
        Ok(release)
    }

    async fn merge_from_master_and_publish_branches(
        &self,
        parent: &NamespaceInfo,
        parent_release: &ReleaseInfo,
        comment: &str,
        operator: &str,
    ) -> anyhow::Result<()> {
        let Some(cluster) = self
            .persistence
            .cluster_find(&parent.app_id, &parent.cluster_name)
            .await?
        else {
            return Ok(());
        };

        for child in self
            .persistence
            .cluster_find_children(&parent.app_id, cluster.id)
            .await?
        {
            let Some(branch) = self
                .persistence
                .namespace_find(&parent.app_id, &child.name, &parent.namespace_name)
                .await?
            else {
                continue;
            };
            // never published branches keep following the parent
            let Some(branch_release) = self
                .find_latest_active(&branch.app_id, &branch.cluster_name, &branch.namespace_name)
                .await?
            else {
                continue;
            };

            let items = self.persistence.item_find_by_namespace(branch.id).await?;
            let branch_configurations = configuration_from_items(&items);
            let mut configurations = parent_release.configuration_map()?;
            configurations.extend(branch_configurations.clone());
            if configurations == branch_release.configuration_map()? {
                continue;
            }

            self.publish_branch(
                parent,
                &branch,
                branch_configurations,
                &parent_release.name,
                comment,
                operator,
            )
            .await?;
        }
        Ok(())
    }

    /// Abandon a release so the previous active one is served again.
    ///
    /// Rolling back a parent release re-merges every published branch onto
    /// the parent's new latest release.
    pub async fn rollback(&self, release_id: i64, operator: &str) -> anyhow::Result<ReleaseInfo> {
        let release = self.find_rollback_source(release_id).await?;

        let latest = self
            .persistence
            .release_find_active(
                &release.app_id,
                &release.cluster_name,
                &release.namespace_name,
                2,
            )
            .await?;
        if latest.len() < 2 {
            return Err(BeaconError::IllegalArgument(format!(
                "Can't rollback namespace(appId={}, clusterName={}, namespaceName={}) because there is only one active release",
                release.app_id, release.cluster_name, release.namespace_name
            ))
            .into());
        }

        self.abandon(&release, &[release_id], operator).await?;
        Ok(ReleaseInfo {
            is_abandoned: true,
            ..release
        })
    }

    /// Abandon every active release of the namespace newer than
    /// `to_release_id`, up to and including `release_id`
    pub async fn rollback_to(
        &self,
        release_id: i64,
        to_release_id: i64,
        operator: &str,
    ) -> anyhow::Result<ReleaseInfo> {
        if release_id == to_release_id {
            return Err(BeaconError::IllegalArgument(
                "current release equal to target release".to_string(),
            )
            .into());
        }
        let release = self.find_rollback_source(release_id).await?;
        let target = self.find_rollback_source(to_release_id).await?;
        if target.app_id != release.app_id
            || target.cluster_name != release.cluster_name
            || target.namespace_name != release.namespace_name
            || target.id > release.id
        {
            return Err(BeaconError::IllegalArgument(format!(
                "release {} is not an earlier release of the same namespace as release {}",
                to_release_id, release_id
            ))
            .into());
        }

        let abandoned: Vec<i64> = self
            .persistence
            .release_find_active_between(
                &release.app_id,
                &release.cluster_name,
                &release.namespace_name,
                to_release_id + 1,
                release_id,
            )
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        self.abandon(&release, &abandoned, operator).await?;
        Ok(target)
    }

    async fn find_rollback_source(&self, release_id: i64) -> anyhow::Result<ReleaseInfo> {
        let release = self
            .persistence
            .release_find_by_id(release_id)
            .await?
            .ok_or(BeaconError::ReleaseNotExist(release_id))?;
        if release.is_abandoned {
            return Err(BeaconError::IllegalArgument("release is not active".to_string()).into());
        }
        Ok(release)
    }

    async fn abandon(
        &self,
        release: &ReleaseInfo,
        ids: &[i64],
        operator: &str,
    ) -> anyhow::Result<()> {
        let message_key = self.message_key(release).await?;
        let message = self
            .persistence
            .release_abandon(ids, operator, &message_key)
            .await?;
        self.message_sender.schedule_clean(message.id);

        info!(
            release_ids = ?ids,
            namespace = %message_key,
            operator,
            "Release rolled back"
        );

        if let Some(namespace) = self
            .persistence
            .namespace_find(&release.app_id, &release.cluster_name, &release.namespace_name)
            .await?
            && self.persistence.namespace_find_parent(&namespace).await?.is_none()
            && let Some(restored) = self
                .find_latest_active(&release.app_id, &release.cluster_name, &release.namespace_name)
                .await?
        {
            self.merge_from_master_and_publish_branches(
                &namespace,
                &restored,
                MASTER_ROLLBACK_COMMENT,
                operator,
            )
            .await?;
        }
        Ok(())
    }

    /// Branch releases are announced under the parent cluster's key
    async fn message_key(&self, release: &ReleaseInfo) -> anyhow::Result<String> {
        let namespace = self
            .persistence
            .namespace_find(
                &release.app_id,
                &release.cluster_name,
                &release.namespace_name,
            )
            .await?;
        if let Some(namespace) = namespace
            && let Some(parent) = self.persistence.namespace_find_parent(&namespace).await?
        {
            return Ok(parent.display_key());
        }
        Ok(assemble_watch_key(
            &release.app_id,
            &release.cluster_name,
            &release.namespace_name,
        ))
    }
}

fn configuration_from_items(items: &[ItemInfo]) -> HashMap<String, String> {
    items
        .iter()
        .filter(|item| item.has_key())
        .map(|item| (item.key.clone(), item.value.clone()))
        .collect()
}

fn new_release(
    namespace: &NamespaceInfo,
    configurations: &HashMap<String, String>,
    name: &str,
    comment: &str,
    operator: &str,
) -> anyhow::Result<NewRelease> {
    let release_key = generate_release_key(
        &namespace.app_id,
        &namespace.cluster_name,
        &namespace.namespace_name,
    );
    let name = if name.trim().is_empty() {
        release_key.clone()
    } else {
        name.to_string()
    };
    Ok(NewRelease {
        release_key,
        name,
        app_id: namespace.app_id.clone(),
        cluster_name: namespace.cluster_name.clone(),
        namespace_name: namespace.namespace_name.clone(),
        configurations: serde_json::to_string(configurations)?,
        comment: comment.to_string(),
        operator: operator.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_persistence::{
        GrayReleaseRulePersistence, ItemPersistence, MemoryPersistService,
        NamespaceLockPersistence, NamespacePersistence, NewGrayReleaseRule, NewItem,
        ReleaseMessagePersistence,
    };

    struct Fixture {
        store: Arc<MemoryPersistService>,
        lock: Arc<NamespaceLockService>,
        service: ReleaseService,
        parent: NamespaceInfo,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryPersistService::new());
        store
            .cluster_create("app1", "default", 0, "alice")
            .await
            .unwrap();
        let parent = store
            .namespace_create("app1", "default", "application", "alice")
            .await
            .unwrap();
        let lock = Arc::new(NamespaceLockService::new(store.clone(), false));
        let sender = Arc::new(DatabaseMessageSender::new(store.clone(), 100, 100));
        let service = ReleaseService::new(store.clone(), lock.clone(), sender);
        Fixture {
            store,
            lock,
            service,
            parent,
        }
    }

    async fn add_item(store: &MemoryPersistService, namespace: &NamespaceInfo, key: &str, value: &str) {
        let item = NewItem {
            key: key.to_string(),
            value: value.to_string(),
            ..Default::default()
        };
        store.item_create(namespace.id, item, "alice").await.unwrap();
    }

    async fn create_branch(f: &Fixture) -> NamespaceInfo {
        let root = f.store.cluster_find("app1", "default").await.unwrap().unwrap();
        f.store
            .cluster_create("app1", "gray", root.id, "alice")
            .await
            .unwrap();
        f.store
            .namespace_create("app1", "gray", "application", "alice")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_publish_snapshots_items_and_unlocks() {
        let f = fixture().await;
        add_item(&f.store, &f.parent, "k", "v").await;
        add_item(&f.store, &f.parent, "", "").await;
        f.lock.acquire_lock(&f.parent, "alice").await.unwrap();

        let release = f
            .service
            .publish("app1", "default", "application", "", "first", "bob", false)
            .await
            .unwrap();

        let configurations = release.configuration_map().unwrap();
        assert_eq!(configurations.len(), 1);
        assert_eq!(configurations["k"], "v");
        assert_eq!(release.name, release.release_key);
        assert!(f.store.lock_find(f.parent.id).await.unwrap().is_none());

        let message = f
            .store
            .message_find_latest_by_messages(&["app1+default+application".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(f.store.message_find_max_id().await.unwrap(), message.id);
    }

    #[tokio::test]
    async fn test_lock_owner_cannot_publish_unless_emergency() {
        let f = fixture().await;
        add_item(&f.store, &f.parent, "k", "v").await;
        f.lock.acquire_lock(&f.parent, "alice").await.unwrap();

        let err = f
            .service
            .publish("app1", "default", "application", "r1", "", "alice", false)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BeaconError>(),
            Some(BeaconError::IllegalArgument(_))
        ));

        f.service
            .publish("app1", "default", "application", "r1", "", "alice", true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_branch_publish_overlays_parent() {
        let f = fixture().await;
        add_item(&f.store, &f.parent, "a", "1").await;
        add_item(&f.store, &f.parent, "b", "2").await;
        f.service
            .publish("app1", "default", "application", "base", "", "bob", false)
            .await
            .unwrap();

        let branch = create_branch(&f).await;
        add_item(&f.store, &branch, "b", "3").await;
        f.store
            .gray_rule_replace(
                NewGrayReleaseRule {
                    app_id: "app1".to_string(),
                    cluster_name: "default".to_string(),
                    namespace_name: "application".to_string(),
                    branch_name: "gray".to_string(),
                    rules: "[]".to_string(),
                    release_id: 0,
                    branch_status: 1,
                    operator: "alice".to_string(),
                },
                "app1+default+application",
            )
            .await
            .unwrap();

        let release = f
            .service
            .publish("app1", "gray", "application", "gray", "", "bob", false)
            .await
            .unwrap();
        assert_eq!(release.cluster_name, "gray");
        let configurations = release.configuration_map().unwrap();
        assert_eq!(configurations["a"], "1");
        assert_eq!(configurations["b"], "3");

        let rule = f
            .store
            .gray_rule_find_latest_by_branch("app1", "default", "application", "gray")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rule.release_id, release.id);

        // a new parent release is merged into the published branch
        add_item(&f.store, &f.parent, "c", "4").await;
        f.service
            .publish("app1", "default", "application", "second", "", "bob", false)
            .await
            .unwrap();
        let refreshed = f
            .service
            .find_latest_active("app1", "gray", "application")
            .await
            .unwrap()
            .unwrap();
        assert!(refreshed.id > release.id);
        let configurations = refreshed.configuration_map().unwrap();
        assert_eq!(configurations["b"], "3");
        assert_eq!(configurations["c"], "4");
    }

    #[tokio::test]
    async fn test_rollback_rules() {
        let f = fixture().await;
        add_item(&f.store, &f.parent, "k", "v1").await;
        let first = f
            .service
            .publish("app1", "default", "application", "r1", "", "bob", false)
            .await
            .unwrap();

        let err = f.service.rollback(first.id, "bob").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BeaconError>(),
            Some(BeaconError::IllegalArgument(_))
        ));

        let second = f
            .service
            .publish("app1", "default", "application", "r2", "", "bob", false)
            .await
            .unwrap();
        let rolled_back = f.service.rollback(second.id, "bob").await.unwrap();
        assert!(rolled_back.is_abandoned);
        let latest = f
            .service
            .find_latest_active("app1", "default", "application")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, first.id);

        let err = f.service.rollback(second.id, "bob").await.unwrap_err();
        assert_eq!(err.to_string(), "caused: release is not active");

        let err = f.service.rollback(999, "bob").await.unwrap_err();
        assert!(err.downcast_ref::<BeaconError>().unwrap().is_not_found());
    }

    #[tokio::test]
    async fn test_rollback_to_rejects_invalid_target() {
        let f = fixture().await;
        add_item(&f.store, &f.parent, "k", "v1").await;
        let first = f
            .service
            .publish("app1", "default", "application", "r1", "", "bob", false)
            .await
            .unwrap();
        let second = f
            .service
            .publish("app1", "default", "application", "r2", "", "bob", false)
            .await
            .unwrap();

        for (from, to) in [(second.id, second.id), (first.id, second.id)] {
            let err = f.service.rollback_to(from, to, "bob").await.unwrap_err();
            assert!(matches!(
                err.downcast_ref::<BeaconError>(),
                Some(BeaconError::IllegalArgument(_))
            ));
        }
        let err = f.service.rollback_to(second.id, 999, "bob").await.unwrap_err();
        assert!(err.downcast_ref::<BeaconError>().unwrap().is_not_found());

        assert_eq!(
            f.service
                .find_latest_active("app1", "default", "application")
                .await
                .unwrap()
                .map(|r| r.id),
            Some(second.id)
        );
    }
}
