//! Server models: configuration, shared state and response bodies

pub mod config;
pub mod constants;
pub mod response;

use std::sync::Arc;

use beacon_release::ReleaseEngine;

pub use config::Configuration;

/// State shared by every HTTP worker
pub struct AppState {
    pub configuration: Configuration,
    pub engine: Arc<ReleaseEngine>,
}
