//! Change log scanner
//!
//! Tails the release message table by id and fans every new row out to the
//! registered listeners.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use beacon_common::constants::RELEASE_MESSAGE_TOPIC;
use beacon_persistence::{PersistenceService, ReleaseMessageInfo};

use super::{ReleaseMessageListener, deliver};

/// Single background poller over the change log.
///
/// The watermark starts at the current maximum id, so history is never
/// replayed, and only advances once a whole batch has been dispatched.
pub struct ReleaseMessageScanner {
    persistence: Arc<dyn PersistenceService>,
    listeners: RwLock<Vec<Arc<dyn ReleaseMessageListener>>>,
    max_id_scanned: AtomicI64,
    scan_interval: Duration,
    batch_size: u64,
}

impl ReleaseMessageScanner {
    pub fn new(
        persistence: Arc<dyn PersistenceService>,
        scan_interval: Duration,
        batch_size: u64,
    ) -> Self {
        Self {
            persistence,
            listeners: RwLock::new(Vec::new()),
            max_id_scanned: AtomicI64::new(0),
            scan_interval,
            batch_size: batch_size.max(1),
        }
    }

    /// Register a listener; registering the same instance twice is a no-op
    pub fn add_message_listener(&self, listener: Arc<dyn ReleaseMessageListener>) {
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return;
        }
        listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn max_id_scanned(&self) -> i64 {
        self.max_id_scanned.load(Ordering::SeqCst)
    }

    /// Position the watermark at the newest existing row
    pub async fn initialize(&self) -> anyhow::Result<i64> {
        let max_id = self.persistence.message_find_max_id().await?;
        self.max_id_scanned.store(max_id, Ordering::SeqCst);
        info!(max_id_scanned = max_id, "Release message scanner initialized");
        Ok(max_id)
    }

    /// Drain every row newer than the watermark. Returns the number dispatched.
    pub async fn scan_messages(&self) -> anyhow::Result<usize> {
        let mut dispatched = 0;
        loop {
            let (count, has_more) = self.scan_and_send_messages().await?;
            dispatched += count;
            if !has_more {
                break;
            }
        }
        Ok(dispatched)
    }

    /// Fetch and dispatch one batch; reports whether a full batch was read
    async fn scan_and_send_messages(&self) -> anyhow::Result<(usize, bool)> {
        let messages = self
            .persistence
            .message_find_after(self.max_id_scanned(), self.batch_size)
            .await?;
        let Some(last) = messages.last() else {
            return Ok((0, false));
        };
        let last_id = last.id;

        self.fire_message_scanned(&messages).await;
        self.max_id_scanned.store(last_id, Ordering::SeqCst);

        debug!(
            count = messages.len(),
            max_id_scanned = last_id,
            "Dispatched release messages"
        );
        Ok((messages.len(), messages.len() as u64 == self.batch_size))
    }

    async fn fire_message_scanned(&self, messages: &[ReleaseMessageInfo]) {
        let listeners: Vec<Arc<dyn ReleaseMessageListener>> = self.listeners.read().clone();
        for message in messages {
            for listener in &listeners {
                deliver(listener.as_ref(), message, RELEASE_MESSAGE_TOPIC).await;
            }
        }
    }

    /// Spawn the periodic scan loop
    pub fn start(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Release message scanner started with interval: {:?}",
                self.scan_interval
            );
            let mut interval =
                tokio::time::interval_at(Instant::now() + self.scan_interval, self.scan_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.scan_messages().await {
                            warn!("Scan and send message failed: {}", e);
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
            info!("Release message scanner stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use beacon_persistence::{MemoryPersistService, ReleaseMessagePersistence};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingListener {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl ReleaseMessageListener for RecordingListener {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn handle_message(
            &self,
            message: &ReleaseMessageInfo,
            channel: &str,
        ) -> anyhow::Result<()> {
            assert_eq!(channel, RELEASE_MESSAGE_TOPIC);
            self.seen.lock().push(message.id);
            Ok(())
        }
    }

    struct FailingListener;

    #[async_trait]
    impl ReleaseMessageListener for FailingListener {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn handle_message(
            &self,
            message: &ReleaseMessageInfo,
            _channel: &str,
        ) -> anyhow::Result<()> {
            if message.id % 2 == 0 {
                panic!("boom");
            }
            anyhow::bail!("always fails")
        }
    }

    fn scanner(store: Arc<MemoryPersistService>, batch_size: u64) -> ReleaseMessageScanner {
        ReleaseMessageScanner::new(store, Duration::from_millis(10), batch_size)
    }

    #[tokio::test]
    async fn test_initialize_skips_history() {
        let store = Arc::new(MemoryPersistService::new());
        store.message_create("a+default+ns").await.unwrap();
        store.message_create("a+default+ns").await.unwrap();

        let scanner = scanner(store.clone(), 500);
        let listener = Arc::new(RecordingListener::default());
        scanner.add_message_listener(listener.clone());

        assert_eq!(scanner.initialize().await.unwrap(), 2);
        assert_eq!(scanner.scan_messages().await.unwrap(), 0);

        let new = store.message_create("a+default+ns").await.unwrap();
        assert_eq!(scanner.scan_messages().await.unwrap(), 1);
        assert_eq!(*listener.seen.lock(), vec![new.id]);
    }

    #[tokio::test]
    async fn test_scan_drains_multiple_batches_in_order() {
        let store = Arc::new(MemoryPersistService::new());
        let scanner = scanner(store.clone(), 2);
        let listener = Arc::new(RecordingListener::default());
        scanner.add_message_listener(listener.clone());
        scanner.initialize().await.unwrap();

        for _ in 0..5 {
            store.message_create("a+default+ns").await.unwrap();
        }
        assert_eq!(scanner.scan_messages().await.unwrap(), 5);
        assert_eq!(*listener.seen.lock(), vec![1, 2, 3, 4, 5]);
        assert_eq!(scanner.max_id_scanned(), 5);
    }

    #[tokio::test]
    async fn test_duplicate_listener_registration_ignored() {
        let store = Arc::new(MemoryPersistService::new());
        let scanner = scanner(store.clone(), 500);
        let listener = Arc::new(RecordingListener::default());
        scanner.add_message_listener(listener.clone());
        scanner.add_message_listener(listener.clone());
        assert_eq!(scanner.listener_count(), 1);

        store.message_create("a+default+ns").await.unwrap();
        scanner.scan_messages().await.unwrap();
        assert_eq!(listener.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_starve_others() {
        let store = Arc::new(MemoryPersistService::new());
        let scanner = scanner(store.clone(), 500);
        let listener = Arc::new(RecordingListener::default());
        scanner.add_message_listener(Arc::new(FailingListener));
        scanner.add_message_listener(listener.clone());

        store.message_create("a+default+ns").await.unwrap();
        store.message_create("a+default+ns").await.unwrap();
        assert_eq!(scanner.scan_messages().await.unwrap(), 2);
        assert_eq!(*listener.seen.lock(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_store_error_keeps_watermark() {
        let store = Arc::new(MemoryPersistService::new());
        let scanner = scanner(store.clone(), 500);
        let listener = Arc::new(RecordingListener::default());
        scanner.add_message_listener(listener.clone());

        store.message_create("a+default+ns").await.unwrap();
        store.set_unavailable(true);
        assert!(scanner.scan_messages().await.is_err());
        assert_eq!(scanner.max_id_scanned(), 0);

        store.set_unavailable(false);
        assert_eq!(scanner.scan_messages().await.unwrap(), 1);
        assert_eq!(*listener.seen.lock(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_loop_dispatches_and_stops() {
        let store = Arc::new(MemoryPersistService::new());
        let scanner = Arc::new(scanner(store.clone(), 500));
        let listener = Arc::new(RecordingListener::default());
        scanner.add_message_listener(listener.clone());

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = scanner.clone().start(shutdown_rx);

        store.message_create("a+default+ns").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*listener.seen.lock(), vec![1]);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
