//! Release persistence trait

use async_trait::async_trait;

use crate::model::{GrayReleaseRuleInfo, NewRelease, ReleaseInfo, ReleaseMessageInfo};

/// Release persistence operations
///
/// Writes that change what clients resolve append a change log row in the
/// same transaction; a failed append rolls the whole write back.
#[async_trait]
pub trait ReleasePersistence: Send + Sync {
    /// Find a release by id, abandoned or not
    async fn release_find_by_id(&self, id: i64) -> anyhow::Result<Option<ReleaseInfo>>;

    /// Find a non-abandoned release by id
    async fn release_find_active_by_id(&self, id: i64) -> anyhow::Result<Option<ReleaseInfo>>;

    /// Highest-id non-abandoned release of a namespace
    async fn release_find_latest_active(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
    ) -> anyhow::Result<Option<ReleaseInfo>>;

    /// Non-abandoned releases of a namespace, newest first
    async fn release_find_active(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
        limit: u64,
    ) -> anyhow::Result<Vec<ReleaseInfo>>;

    /// Non-abandoned releases of a namespace with ids in `min_id..=max_id`,
    /// newest first
    async fn release_find_active_between(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
        min_id: i64,
        max_id: i64,
    ) -> anyhow::Result<Vec<ReleaseInfo>>;

    /// Insert a release and its change log row atomically
    async fn release_publish(
        &self,
        release: NewRelease,
        message: &str,
    ) -> anyhow::Result<(ReleaseInfo, ReleaseMessageInfo)>;

    /// Insert a branch release, point the branch's gray rule at it and append
    /// the change log row, atomically.
    ///
    /// The branch is `release.cluster_name`; its rule lives under
    /// `parent_cluster_name`. Returns the refreshed rule when one existed.
    async fn release_publish_branch(
        &self,
        release: NewRelease,
        parent_cluster_name: &str,
        message: &str,
    ) -> anyhow::Result<(ReleaseInfo, Option<GrayReleaseRuleInfo>, ReleaseMessageInfo)>;

    /// Mark releases abandoned and append the change log row atomically.
    ///
    /// Fails without changes when any id is missing.
    async fn release_abandon(
        &self,
        ids: &[i64],
        operator: &str,
        message: &str,
    ) -> anyhow::Result<ReleaseMessageInfo>;
}
