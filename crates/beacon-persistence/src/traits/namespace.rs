//! Cluster and namespace persistence trait

use async_trait::async_trait;

use crate::model::{ClusterInfo, NamespaceInfo};

/// Cluster and namespace persistence operations
#[async_trait]
pub trait NamespacePersistence: Send + Sync {
    async fn cluster_create(
        &self,
        app_id: &str,
        name: &str,
        parent_cluster_id: i64,
        operator: &str,
    ) -> anyhow::Result<ClusterInfo>;

    async fn cluster_find(&self, app_id: &str, name: &str) -> anyhow::Result<Option<ClusterInfo>>;

    async fn cluster_find_by_id(&self, id: i64) -> anyhow::Result<Option<ClusterInfo>>;

    /// Branch clusters whose parent is `parent_cluster_id`
    async fn cluster_find_children(
        &self,
        app_id: &str,
        parent_cluster_id: i64,
    ) -> anyhow::Result<Vec<ClusterInfo>>;

    /// Soft-delete a cluster together with its namespaces and their locks.
    /// `false` when the cluster did not exist.
    async fn cluster_delete(&self, id: i64, operator: &str) -> anyhow::Result<bool>;

    async fn namespace_create(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
        operator: &str,
    ) -> anyhow::Result<NamespaceInfo>;

    async fn namespace_find(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
    ) -> anyhow::Result<Option<NamespaceInfo>>;

    async fn namespace_find_by_id(&self, id: i64) -> anyhow::Result<Option<NamespaceInfo>>;

    /// Same-named namespace in the parent cluster of a branch, if any
    async fn namespace_find_parent(
        &self,
        namespace: &NamespaceInfo,
    ) -> anyhow::Result<Option<NamespaceInfo>>;
}
