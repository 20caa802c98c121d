//! Beacon common module
//!
//! This crate provides shared types and utilities used across all Beacon crates:
//! - Error types (`BeaconError`, `AppError`, `ErrorCode`)
//! - Well-known constants (default cluster, watch key separator, placeholders)
//! - Watch key assembly and parsing
//! - Release key generation

pub mod constants;
pub mod error;
pub mod utils;
pub mod watch_key;

pub use error::{AppError, BeaconError, ErrorCode};
pub use watch_key::{WatchKey, assemble_watch_key};
