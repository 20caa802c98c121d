//! HTTP API
//!
//! Client endpoints (`configs`, `configfiles`, `notifications`) and the
//! admin write path (items, releases, branches, lock status).

pub mod branch;
pub mod config;
pub mod configfiles;
pub mod health;
pub mod item;
pub mod lock;
pub mod notification;
pub mod release;
pub mod route;

use serde::Deserialize;

/// `{appId}/{clusterName}/{namespace}` as used by the client endpoints
#[derive(Debug, Deserialize)]
pub struct NamespacePath {
    pub app_id: String,
    pub cluster_name: String,
    pub namespace: String,
}

/// Query carrying only the acting user
#[derive(Debug, Deserialize)]
pub struct OperatorQuery {
    pub operator: String,
}
