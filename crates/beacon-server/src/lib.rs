//! Beacon server
//!
//! HTTP front of the release engine: configuration loading, logging,
//! routes and process lifecycle.

pub mod api;
pub mod model;
pub mod startup;
