//! Release engine services

mod branch_service;
mod cached_config_service;
mod config_file_service;
mod config_service;
mod item_service;
mod namespace_lock_service;
mod notification_service;
mod release_service;

pub use branch_service::BranchService;
pub use cached_config_service::CachedConfigService;
pub use config_file_service::ConfigFileService;
pub use config_service::{ConfigService, DefaultConfigService};
pub use item_service::ItemService;
pub use namespace_lock_service::NamespaceLockService;
pub use notification_service::{ConfigChangeEvent, NotificationService};
pub use release_service::ReleaseService;
