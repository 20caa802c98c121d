//! Beacon persistence layer
//!
//! This crate provides:
//! - SeaORM entities for the release tables
//! - Backend-neutral storage models
//! - Persistence traits, one per concern, combined by `PersistenceService`
//! - `ExternalDbPersistService` (MySQL/PostgreSQL) and `MemoryPersistService`

pub mod entity;
pub mod memory;
pub mod model;
pub mod sql;
pub mod traits;

pub use memory::MemoryPersistService;
pub use model::*;
pub use sql::ExternalDbPersistService;
pub use traits::*;
