//! Gray release rule persistence trait

use async_trait::async_trait;

use crate::model::{GrayReleaseRuleInfo, NewGrayReleaseRule, ReleaseMessageInfo};

/// Gray release rule persistence operations
///
/// Only non-deleted rows are returned by the finders.
#[async_trait]
pub trait GrayReleaseRulePersistence: Send + Sync {
    /// All rules of a parent namespace, ascending by id
    async fn gray_rule_find_by_namespace(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
    ) -> anyhow::Result<Vec<GrayReleaseRuleInfo>>;

    /// Newest rule of one branch
    async fn gray_rule_find_latest_by_branch(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
        branch_name: &str,
    ) -> anyhow::Result<Option<GrayReleaseRuleInfo>>;

    /// Up to `limit` rules with id greater than `after_id`, ascending
    async fn gray_rule_find_after(
        &self,
        after_id: i64,
        limit: u64,
    ) -> anyhow::Result<Vec<GrayReleaseRuleInfo>>;

    /// Soft-delete the branch's current rules, insert `rule` and append the
    /// change log row, atomically
    async fn gray_rule_replace(
        &self,
        rule: NewGrayReleaseRule,
        message: &str,
    ) -> anyhow::Result<(GrayReleaseRuleInfo, ReleaseMessageInfo)>;
}
