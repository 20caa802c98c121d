//! Data models shared by the release services and the HTTP layer

mod config;
mod lock;
mod notification;

pub use config::*;
pub use lock::*;
pub use notification::*;
