//! Item persistence trait

use async_trait::async_trait;

use crate::model::{ItemInfo, NewItem};

/// Item persistence operations
#[async_trait]
pub trait ItemPersistence: Send + Sync {
    /// Items of a namespace in line order
    async fn item_find_by_namespace(&self, namespace_id: i64) -> anyhow::Result<Vec<ItemInfo>>;

    async fn item_find_by_id(&self, id: i64) -> anyhow::Result<Option<ItemInfo>>;

    async fn item_find_by_key(
        &self,
        namespace_id: i64,
        key: &str,
    ) -> anyhow::Result<Option<ItemInfo>>;

    async fn item_create(
        &self,
        namespace_id: i64,
        item: NewItem,
        operator: &str,
    ) -> anyhow::Result<ItemInfo>;

    /// Update value and comment; `None` when the item does not exist
    async fn item_update(
        &self,
        id: i64,
        value: &str,
        comment: &str,
        operator: &str,
    ) -> anyhow::Result<Option<ItemInfo>>;

    /// Soft-delete; `false` when the item does not exist
    async fn item_delete(&self, id: i64, operator: &str) -> anyhow::Result<bool>;
}
