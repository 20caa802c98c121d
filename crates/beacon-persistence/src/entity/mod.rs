//! SeaORM entities for the release tables

pub mod cluster;
pub mod gray_release_rule;
pub mod item;
pub mod namespace;
pub mod namespace_lock;
pub mod release;
pub mod release_message;

pub mod prelude {
    pub use super::cluster::Entity as Cluster;
    pub use super::gray_release_rule::Entity as GrayReleaseRule;
    pub use super::item::Entity as Item;
    pub use super::namespace::Entity as Namespace;
    pub use super::namespace_lock::Entity as NamespaceLock;
    pub use super::release::Entity as Release;
    pub use super::release_message::Entity as ReleaseMessage;
}
