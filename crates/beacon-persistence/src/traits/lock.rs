//! Namespace lock persistence trait

use async_trait::async_trait;

use crate::model::{LockInsertOutcome, NamespaceLockInfo};

/// Namespace lock persistence operations
#[async_trait]
pub trait NamespaceLockPersistence: Send + Sync {
    async fn lock_find(&self, namespace_id: i64) -> anyhow::Result<Option<NamespaceLockInfo>>;

    /// Insert the lock row; a unique-constraint violation is reported as
    /// `LockInsertOutcome::Conflict` rather than an error
    async fn lock_try_insert(
        &self,
        namespace_id: i64,
        owner: &str,
    ) -> anyhow::Result<LockInsertOutcome>;

    /// Remove the lock row; `false` when none existed
    async fn lock_delete(&self, namespace_id: i64) -> anyhow::Result<bool>;
}
