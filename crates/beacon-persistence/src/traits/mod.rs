//! Persistence traits for the storage abstraction layer
//!
//! Each trait covers one table family. `PersistenceService` combines them so
//! services can hold a single `Arc<dyn PersistenceService>` regardless of the
//! configured backend.

pub mod gray_rule;
pub mod item;
pub mod lock;
pub mod message;
pub mod namespace;
pub mod release;

pub use gray_rule::GrayReleaseRulePersistence;
pub use item::ItemPersistence;
pub use lock::NamespaceLockPersistence;
pub use message::ReleaseMessagePersistence;
pub use namespace::NamespacePersistence;
pub use release::ReleasePersistence;

use async_trait::async_trait;

use crate::model::StorageMode;

/// Unified persistence service trait
///
/// This is the main interface for all storage operations. Implementations
/// dispatch to the configured storage backend.
#[async_trait]
pub trait PersistenceService:
    ReleasePersistence
    + ReleaseMessagePersistence
    + GrayReleaseRulePersistence
    + NamespacePersistence
    + ItemPersistence
    + NamespaceLockPersistence
    + Send
    + Sync
{
    /// Get the current storage mode
    fn storage_mode(&self) -> StorageMode;

    /// Health check for the storage backend
    async fn health_check(&self) -> anyhow::Result<()>;
}
