//! Change log plumbing
//!
//! Writers append release messages through [`DatabaseMessageSender`]; a single
//! [`ReleaseMessageScanner`] tails the log and fans each new row out to the
//! registered [`ReleaseMessageListener`]s.

mod cache;
mod scanner;
mod sender;

pub use cache::ReleaseMessageCache;
pub use scanner::ReleaseMessageScanner;
pub use sender::DatabaseMessageSender;

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::error;

use beacon_persistence::ReleaseMessageInfo;

/// Receives every change log row the scanner observes
#[async_trait]
pub trait ReleaseMessageListener: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    async fn handle_message(
        &self,
        message: &ReleaseMessageInfo,
        channel: &str,
    ) -> anyhow::Result<()>;
}

/// Deliver one message, containing errors and panics to the listener
pub(crate) async fn deliver(
    listener: &dyn ReleaseMessageListener,
    message: &ReleaseMessageInfo,
    channel: &str,
) {
    match AssertUnwindSafe(listener.handle_message(message, channel))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(
            listener = listener.name(),
            message_id = message.id,
            "Failed to invoke message listener: {}",
            e
        ),
        Err(_) => error!(
            listener = listener.name(),
            message_id = message.id,
            "Message listener panicked"
        ),
    }
}
