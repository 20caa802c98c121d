//! Gray branch lifecycle
//!
//! A branch is a child cluster of a root cluster carrying its own copy of one
//! namespace. Its targeting lives in gray rule rows keyed by the parent
//! cluster; every rule change is announced under the parent's watch key.

use std::sync::Arc;

use tracing::info;

use beacon_common::BeaconError;
use beacon_common::constants::EMPTY_GRAY_RULES;
use beacon_persistence::{GrayReleaseRuleInfo, NamespaceInfo, NewGrayReleaseRule, PersistenceService};

use crate::gray::{BranchStatus, GrayReleaseRuleItem, parse_rule_items};
use crate::message::DatabaseMessageSender;

pub struct BranchService {
    persistence: Arc<dyn PersistenceService>,
    message_sender: Arc<DatabaseMessageSender>,
}

impl BranchService {
    pub fn new(
        persistence: Arc<dyn PersistenceService>,
        message_sender: Arc<DatabaseMessageSender>,
    ) -> Self {
        Self {
            persistence,
            message_sender,
        }
    }

    async fn find_parent_namespace(
        &self,
        app_id: &str,
        parent_cluster: &str,
        namespace: &str,
    ) -> anyhow::Result<NamespaceInfo> {
        self.persistence
            .namespace_find(app_id, parent_cluster, namespace)
            .await?
            .ok_or_else(|| {
                BeaconError::NamespaceNotExist(beacon_common::assemble_watch_key(
                    app_id,
                    parent_cluster,
                    namespace,
                ))
                .into()
            })
    }

    /// The branch namespace of a parent namespace, if one exists
    pub async fn find_branch(
        &self,
        app_id: &str,
        parent_cluster: &str,
        namespace: &str,
    ) -> anyhow::Result<Option<NamespaceInfo>> {
        let Some(cluster) = self.persistence.cluster_find(app_id, parent_cluster).await? else {
            return Ok(None);
        };
        for child in self
            .persistence
            .cluster_find_children(app_id, cluster.id)
            .await?
        {
            if let Some(branch) = self
                .persistence
                .namespace_find(app_id, &child.name, namespace)
                .await?
            {
                return Ok(Some(branch));
            }
        }
        Ok(None)
    }

    async fn require_branch(
        &self,
        app_id: &str,
        parent_cluster: &str,
        namespace: &str,
        branch_name: &str,
    ) -> anyhow::Result<NamespaceInfo> {
        match self.find_branch(app_id, parent_cluster, namespace).await? {
            Some(branch) if branch.cluster_name == branch_name => Ok(branch),
            _ => Err(BeaconError::NamespaceNotExist(beacon_common::assemble_watch_key(
                app_id,
                branch_name,
                namespace,
            ))
            .into()),
        }
    }

    /// Create the child cluster and namespace of a new branch
    pub async fn create_branch(
        &self,
        app_id: &str,
        parent_cluster: &str,
        namespace: &str,
        branch_name: &str,
        operator: &str,
    ) -> anyhow::Result<NamespaceInfo> {
        self.find_parent_namespace(app_id, parent_cluster, namespace)
            .await?;
        if self
            .find_branch(app_id, parent_cluster, namespace)
            .await?
            .is_some()
        {
            return Err(
                BeaconError::IllegalArgument("namespace already has branch".to_string()).into(),
            );
        }

        let parent = self
            .persistence
            .cluster_find(app_id, parent_cluster)
            .await?
            .filter(|cluster| cluster.parent_cluster_id == 0)
            .ok_or_else(|| {
                BeaconError::IllegalArgument("cluster not exist or illegal cluster".to_string())
            })?;
        if self
            .persistence
            .cluster_find(app_id, branch_name)
            .await?
            .is_some()
        {
            return Err(BeaconError::IllegalArgument(format!(
                "cluster already exists: {}",
                branch_name
            ))
            .into());
        }

        self.persistence
            .cluster_create(app_id, branch_name, parent.id, operator)
            .await?;
        let branch = self
            .persistence
            .namespace_create(app_id, branch_name, namespace, operator)
            .await?;

        info!(
            branch = branch_name,
            namespace = %beacon_common::assemble_watch_key(app_id, parent_cluster, namespace),
            operator,
            "Branch created"
        );
        Ok(branch)
    }

    /// Current rule of a branch, decoded
    pub async fn find_branch_rules(
        &self,
        app_id: &str,
        parent_cluster: &str,
        namespace: &str,
        branch_name: &str,
    ) -> anyhow::Result<Option<(GrayReleaseRuleInfo, Vec<GrayReleaseRuleItem>)>> {
        let Some(rule) = self
            .persistence
            .gray_rule_find_latest_by_branch(app_id, parent_cluster, namespace, branch_name)
            .await?
        else {
            return Ok(None);
        };
        let items = parse_rule_items(&rule.rules)?;
        Ok(Some((rule, items)))
    }

    /// Replace the targeting of an active branch
    pub async fn update_branch_rules(
        &self,
        app_id: &str,
        parent_cluster: &str,
        namespace: &str,
        branch_name: &str,
        rules: &[GrayReleaseRuleItem],
        operator: &str,
    ) -> anyhow::Result<GrayReleaseRuleInfo> {
        self.require_branch(app_id, parent_cluster, namespace, branch_name)
            .await?;
        if rules.iter().any(|rule| rule.client_app_id.trim().is_empty()) {
            return Err(
                BeaconError::IllegalArgument("clientAppId can not be blank".to_string()).into(),
            );
        }

        let payload = serde_json::to_string(rules)?;
        self.replace_rule(
            app_id,
            parent_cluster,
            namespace,
            branch_name,
            payload,
            BranchStatus::Active,
            operator,
        )
        .await
    }

    /// Retire a branch, either discarded or merged into its parent
    pub async fn delete_branch(
        &self,
        app_id: &str,
        parent_cluster: &str,
        namespace: &str,
        branch_name: &str,
        branch_status: BranchStatus,
        operator: &str,
    ) -> anyhow::Result<()> {
        if branch_status == BranchStatus::Active {
            return Err(BeaconError::IllegalArgument(
                "branch status must be deleted or merged".to_string(),
            )
            .into());
        }
        let Some(cluster) = self.persistence.cluster_find(app_id, branch_name).await? else {
            return Ok(());
        };

        self.replace_rule(
            app_id,
            parent_cluster,
            namespace,
            branch_name,
            EMPTY_GRAY_RULES.to_string(),
            branch_status,
            operator,
        )
        .await?;
        self.persistence.cluster_delete(cluster.id, operator).await?;

        info!(
            branch = branch_name,
            status = ?branch_status,
            operator,
            "Branch deleted"
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn replace_rule(
        &self,
        app_id: &str,
        parent_cluster: &str,
        namespace: &str,
        branch_name: &str,
        rules: String,
        branch_status: BranchStatus,
        operator: &str,
    ) -> anyhow::Result<GrayReleaseRuleInfo> {
        let release_id = self
            .persistence
            .release_find_latest_active(app_id, branch_name, namespace)
            .await?
            .map(|release| release.id)
            .unwrap_or(0);

        let new = NewGrayReleaseRule {
            app_id: app_id.to_string(),
            cluster_name: parent_cluster.to_string(),
            namespace_name: namespace.to_string(),
            branch_name: branch_name.to_string(),
            rules,
            release_id,
            branch_status: branch_status.as_i16(),
            operator: operator.to_string(),
        };
        let message_key = beacon_common::assemble_watch_key(app_id, parent_cluster, namespace);
        let (rule, message) = self
            .persistence
            .gray_rule_replace(new, &message_key)
            .await?;
        self.message_sender.schedule_clean(message.id);

        info!(
            rule_id = rule.id,
            release_id,
            branch = branch_name,
            namespace = %message_key,
            "Gray release rule updated"
        );
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_persistence::{MemoryPersistService, NamespacePersistence, ReleaseMessagePersistence};

    async fn fixture() -> (Arc<MemoryPersistService>, BranchService) {
        let store = Arc::new(MemoryPersistService::new());
        store
            .cluster_create("app1", "default", 0, "alice")
            .await
            .unwrap();
        store
            .namespace_create("app1", "default", "application", "alice")
            .await
            .unwrap();
        let sender = Arc::new(DatabaseMessageSender::new(store.clone(), 100, 100));
        (store.clone(), BranchService::new(store, sender))
    }

    #[tokio::test]
    async fn test_branch_lifecycle() {
        let (store, service) = fixture().await;
        let branch = service
            .create_branch("app1", "default", "application", "gray", "alice")
            .await
            .unwrap();
        assert_eq!(branch.cluster_name, "gray");

        let err = service
            .create_branch("app1", "default", "application", "gray2", "alice")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "caused: namespace already has branch");

        let rules = vec![GrayReleaseRuleItem::new("app2", &["10.0.0.5"])];
        let rule = service
            .update_branch_rules("app1", "default", "application", "gray", &rules, "alice")
            .await
            .unwrap();
        assert_eq!(rule.branch_status, BranchStatus::Active.as_i16());
        assert_eq!(rule.release_id, 0);

        let (found, items) = service
            .find_branch_rules("app1", "default", "application", "gray")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, rule.id);
        assert_eq!(items, rules);

        service
            .delete_branch(
                "app1",
                "default",
                "application",
                "gray",
                BranchStatus::Deleted,
                "alice",
            )
            .await
            .unwrap();
        let (deleted, items) = service
            .find_branch_rules("app1", "default", "application", "gray")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deleted.branch_status, BranchStatus::Deleted.as_i16());
        assert!(items.is_empty());
        assert!(
            service
                .find_branch("app1", "default", "application")
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.cluster_find("app1", "gray").await.unwrap().is_none());

        let messages = store
            .message_find_after(0, 100)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.message == "app1+default+application")
            .count();
        assert_eq!(messages, 2);
    }

    #[tokio::test]
    async fn test_rules_on_missing_branch_rejected() {
        let (_, service) = fixture().await;
        let err = service
            .update_branch_rules("app1", "default", "application", "gray", &[], "alice")
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<BeaconError>().unwrap().is_not_found());

        let err = service
            .create_branch("app1", "default", "missing", "gray", "alice")
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<BeaconError>().unwrap().is_not_found());
    }
}
