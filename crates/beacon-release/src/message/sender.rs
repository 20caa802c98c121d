//! Change log writer and pruner

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use beacon_persistence::{PersistenceService, ReleaseMessageInfo};

/// Appends change log rows and trims superseded rows for the same key.
///
/// Rows written inside a business transaction are handed to
/// [`schedule_clean`](Self::schedule_clean) after commit. The pruning queue is
/// bounded and never blocks the writer: when full, the id is dropped and the
/// next write for the same key prunes instead.
pub struct DatabaseMessageSender {
    persistence: Arc<dyn PersistenceService>,
    to_clean: mpsc::Sender<i64>,
    to_clean_rx: Mutex<Option<mpsc::Receiver<i64>>>,
    clean_batch_size: u64,
}

impl DatabaseMessageSender {
    pub fn new(
        persistence: Arc<dyn PersistenceService>,
        queue_size: usize,
        clean_batch_size: u64,
    ) -> Self {
        let (to_clean, rx) = mpsc::channel(queue_size.max(1));
        Self {
            persistence,
            to_clean,
            to_clean_rx: Mutex::new(Some(rx)),
            clean_batch_size: clean_batch_size.max(1),
        }
    }

    /// Append a standalone row for `key` and schedule pruning of older rows
    pub async fn send_message(&self, key: &str) -> anyhow::Result<ReleaseMessageInfo> {
        let message = self.persistence.message_create(key).await?;
        debug!(message_id = message.id, key, "release message sent");
        self.schedule_clean(message.id);
        Ok(message)
    }

    /// Offer a committed row id to the pruning queue
    pub fn schedule_clean(&self, message_id: i64) {
        if let Err(e) = self.to_clean.try_send(message_id) {
            debug!(message_id, "Release message clean queue rejected id: {}", e);
        }
    }

    /// Delete every earlier row carrying the same message as `message_id`
    pub async fn clean_message(&self, message_id: i64) -> anyhow::Result<u64> {
        let Some(message) = self.persistence.message_find_by_id(message_id).await? else {
            return Ok(0);
        };

        let mut removed = 0;
        loop {
            let batch = self
                .persistence
                .message_find_earlier(&message.message, message.id, self.clean_batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }
            let ids: Vec<i64> = batch.iter().map(|m| m.id).collect();
            removed += self.persistence.message_delete_by_ids(&ids).await?;
            if (batch.len() as u64) < self.clean_batch_size {
                break;
            }
        }
        Ok(removed)
    }

    /// Spawn the cleaner task. Only the first call starts a task.
    pub fn start(
        self: Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Option<JoinHandle<()>> {
        let mut rx = self.to_clean_rx.lock().take()?;
        Some(tokio::spawn(async move {
            info!("Release message cleaner started");
            loop {
                tokio::select! {
                    next = rx.recv() => match next {
                        Some(id) => {
                            if let Err(e) = self.clean_message(id).await {
                                warn!(message_id = id, "Failed to clean release messages: {}", e);
                            }
                        }
                        None => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
            info!("Release message cleaner stopped");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_persistence::{MemoryPersistService, ReleaseMessagePersistence};

    #[tokio::test]
    async fn test_clean_message_removes_earlier_rows_for_same_key() {
        let store = Arc::new(MemoryPersistService::new());
        let sender = DatabaseMessageSender::new(store.clone(), 10, 2);

        for _ in 0..5 {
            store.message_create("app1+default+application").await.unwrap();
        }
        store.message_create("app1+default+other").await.unwrap();
        let latest = store.message_create("app1+default+application").await.unwrap();

        let removed = sender.clean_message(latest.id).await.unwrap();
        assert_eq!(removed, 5);
        assert_eq!(store.message_count(), 2);
        assert!(store.message_find_by_id(latest.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clean_missing_message_is_noop() {
        let store = Arc::new(MemoryPersistService::new());
        let sender = DatabaseMessageSender::new(store.clone(), 10, 100);
        assert_eq!(sender.clean_message(42).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_ids() {
        let store = Arc::new(MemoryPersistService::new());
        let sender = DatabaseMessageSender::new(store.clone(), 1, 100);
        sender.schedule_clean(1);
        sender.schedule_clean(2);

        let mut rx = sender.to_clean_rx.lock().take().unwrap();
        assert_eq!(rx.try_recv().ok(), Some(1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_message_appends_row() {
        let store = Arc::new(MemoryPersistService::new());
        let sender = DatabaseMessageSender::new(store.clone(), 10, 100);
        let message = sender.send_message("app1+default+application").await.unwrap();
        assert_eq!(message.message, "app1+default+application");
        assert_eq!(store.message_find_max_id().await.unwrap(), message.id);
    }
}
