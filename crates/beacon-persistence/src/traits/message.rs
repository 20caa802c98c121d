//! Release message (change log) persistence trait

use async_trait::async_trait;

use crate::model::ReleaseMessageInfo;

/// Change log persistence operations
#[async_trait]
pub trait ReleaseMessagePersistence: Send + Sync {
    /// Append a row outside of any business transaction
    async fn message_create(&self, message: &str) -> anyhow::Result<ReleaseMessageInfo>;

    async fn message_find_by_id(&self, id: i64) -> anyhow::Result<Option<ReleaseMessageInfo>>;

    /// Largest id in the log, 0 when empty
    async fn message_find_max_id(&self) -> anyhow::Result<i64>;

    /// Up to `limit` rows with id greater than `after_id`, ascending
    async fn message_find_after(
        &self,
        after_id: i64,
        limit: u64,
    ) -> anyhow::Result<Vec<ReleaseMessageInfo>>;

    /// Newest row whose message is one of `messages`
    async fn message_find_latest_by_messages(
        &self,
        messages: &[String],
    ) -> anyhow::Result<Option<ReleaseMessageInfo>>;

    /// Up to `limit` rows for `message` with id lower than `before_id`, ascending
    async fn message_find_earlier(
        &self,
        message: &str,
        before_id: i64,
        limit: u64,
    ) -> anyhow::Result<Vec<ReleaseMessageInfo>>;

    /// Physically delete rows; returns the number removed
    async fn message_delete_by_ids(&self, ids: &[i64]) -> anyhow::Result<u64>;
}
