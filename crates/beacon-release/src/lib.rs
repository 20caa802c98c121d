//! Beacon release engine
//!
//! Turns writes to the configuration store into in-process facts on every
//! serving node:
//!
//! - [`message`]: change log sender, scanner and per-key cache
//! - [`gray`]: gray release rule index
//! - [`service`]: release resolution, caches, long polling, namespace lock
//!   and the write path
//! - [`engine`]: wiring and background task lifecycle

pub mod config;
pub mod engine;
pub mod gray;
pub mod message;
pub mod model;
pub mod service;

pub use config::ReleaseEngineConfig;
pub use engine::ReleaseEngine;
