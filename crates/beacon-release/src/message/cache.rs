//! In-memory index of the newest change log row per watch key

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use beacon_common::constants::RELEASE_MESSAGE_TOPIC;
use beacon_persistence::{PersistenceService, ReleaseMessageInfo};

use super::ReleaseMessageListener;

/// Newest release message per watch key.
///
/// Loaded in full at start-up, then kept current by a catch-up scan until the
/// scanner delivers its first message; from then on the listener path alone
/// keeps it fresh.
pub struct ReleaseMessageCache {
    persistence: Arc<dyn PersistenceService>,
    release_messages: DashMap<String, ReleaseMessageInfo>,
    max_id_scanned: AtomicI64,
    do_scan: AtomicBool,
    merge_lock: Mutex<()>,
    scan_interval: Duration,
    batch_size: u64,
}

impl ReleaseMessageCache {
    pub fn new(
        persistence: Arc<dyn PersistenceService>,
        scan_interval: Duration,
        batch_size: u64,
    ) -> Self {
        Self {
            persistence,
            release_messages: DashMap::new(),
            max_id_scanned: AtomicI64::new(0),
            do_scan: AtomicBool::new(true),
            merge_lock: Mutex::new(()),
            scan_interval,
            batch_size: batch_size.max(1),
        }
    }

    pub fn max_id_scanned(&self) -> i64 {
        self.max_id_scanned.load(Ordering::SeqCst)
    }

    /// Load the whole change log
    pub async fn initialize(&self) -> anyhow::Result<()> {
        self.load_release_messages(0).await?;
        info!(
            keys = self.release_messages.len(),
            max_id_scanned = self.max_id_scanned(),
            "Release message cache initialized"
        );
        Ok(())
    }

    /// Newest row among `keys`
    pub fn find_latest_release_message_for_messages(
        &self,
        keys: &BTreeSet<String>,
    ) -> Option<ReleaseMessageInfo> {
        keys.iter()
            .filter_map(|key| self.release_messages.get(key).map(|m| m.value().clone()))
            .max_by_key(|m| m.id)
    }

    /// Newest row of each key in `keys` that has one
    pub fn find_latest_release_messages_group_by_messages(
        &self,
        keys: &BTreeSet<String>,
    ) -> Vec<ReleaseMessageInfo> {
        keys.iter()
            .filter_map(|key| self.release_messages.get(key).map(|m| m.value().clone()))
            .collect()
    }

    async fn load_release_messages(&self, from_id: i64) -> anyhow::Result<()> {
        let mut last_id = from_id;
        loop {
            let batch = self
                .persistence
                .message_find_after(last_id, self.batch_size)
                .await?;
            let Some(last) = batch.last() else {
                break;
            };
            last_id = last.id;
            for message in &batch {
                self.merge_release_message(message);
            }
            if (batch.len() as u64) < self.batch_size {
                break;
            }
        }
        Ok(())
    }

    fn merge_release_message(&self, message: &ReleaseMessageInfo) {
        let _guard = self.merge_lock.lock();
        self.release_messages
            .entry(message.message.clone())
            .and_modify(|existing| {
                if existing.id < message.id {
                    *existing = message.clone();
                }
            })
            .or_insert_with(|| message.clone());
        self.max_id_scanned.fetch_max(message.id, Ordering::SeqCst);
    }

    /// Spawn the catch-up scan that runs until the scanner takes over
    pub fn start(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while self.do_scan.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = tokio::time::sleep(self.scan_interval) => {}
                    _ = shutdown.recv() => break,
                }
                if !self.do_scan.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = self.load_release_messages(self.max_id_scanned()).await {
                    warn!("Scan new release messages failed: {}", e);
                }
            }
            debug!("Release message cache catch-up scan stopped");
        })
    }
}

#[async_trait]
impl ReleaseMessageListener for ReleaseMessageCache {
    fn name(&self) -> &'static str {
        "release-message-cache"
    }

    async fn handle_message(
        &self,
        message: &ReleaseMessageInfo,
        channel: &str,
    ) -> anyhow::Result<()> {
        self.do_scan.store(false, Ordering::SeqCst);
        if channel != RELEASE_MESSAGE_TOPIC {
            return Ok(());
        }

        let gap = message.id - self.max_id_scanned();
        if gap == 1 {
            self.merge_release_message(message);
        } else if gap > 1 {
            self.load_release_messages(self.max_id_scanned()).await?;
        }
        Ok(())
    }
}
