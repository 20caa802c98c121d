//! Long polling notifications
//!
//! Clients hold a request open until one of the watch keys behind their
//! namespaces moves past the notification id they already know.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;
use tracing::debug;

use beacon_common::BeaconError;
use beacon_common::constants::{NOTIFICATION_ID_PLACEHOLDER, RELEASE_MESSAGE_TOPIC};
use beacon_common::utils::normalize_namespace;
use beacon_common::watch_key::assemble_all_watch_keys;
use beacon_persistence::ReleaseMessageInfo;

use crate::message::{ReleaseMessageCache, ReleaseMessageListener};
use crate::model::{ConfigNotification, NotificationMessages, NotificationRequest};

/// A watch key moved to a new notification id
#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    pub watched_key: String,
    pub notification_id: i64,
}

pub struct NotificationService {
    message_cache: Arc<ReleaseMessageCache>,
    change_sender: broadcast::Sender<ConfigChangeEvent>,
    timeout: Duration,
}

impl NotificationService {
    pub fn new(message_cache: Arc<ReleaseMessageCache>, timeout: Duration) -> Self {
        let (change_sender, _) = broadcast::channel(1024);
        Self {
            message_cache,
            change_sender,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.change_sender.subscribe()
    }

    /// Answer at once when any namespace is behind, otherwise wait for the
    /// first change on a watched key. An empty result means the wait timed
    /// out.
    pub async fn poll_notifications(
        &self,
        app_id: &str,
        cluster: &str,
        data_center: Option<&str>,
        notifications: Vec<NotificationRequest>,
    ) -> anyhow::Result<Vec<ConfigNotification>> {
        let requests = filter_notifications(notifications);
        if requests.is_empty() {
            return Err(
                BeaconError::IllegalArgument("Invalid format of notifications".to_string()).into(),
            );
        }

        let watched: BTreeMap<&str, BTreeSet<String>> = requests
            .keys()
            .map(|namespace| {
                (
                    namespace.as_str(),
                    assemble_all_watch_keys(app_id, cluster, namespace, data_center),
                )
            })
            .collect();

        // subscribe before reading the cache so no change slips in between
        let mut receiver = self.change_sender.subscribe();

        let all_keys: BTreeSet<String> = watched.values().flatten().cloned().collect();
        let latest = self
            .message_cache
            .find_latest_release_messages_group_by_messages(&all_keys);
        let changed = changed_notifications(&requests, &watched, &latest);
        if !changed.is_empty() {
            return Ok(changed);
        }

        let key_to_namespace: HashMap<&str, &str> = watched
            .iter()
            .flat_map(|(namespace, keys)| keys.iter().map(move |key| (key.as_str(), *namespace)))
            .collect();

        let wait = async {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if let Some(namespace) = key_to_namespace.get(event.watched_key.as_str()) {
                            let mut messages = NotificationMessages::new();
                            messages.add(event.watched_key.clone(), event.notification_id);
                            return vec![ConfigNotification::with_messages(
                                namespace.to_string(),
                                event.notification_id,
                                messages,
                            )];
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Long polling receiver lagged");
                    }
                    Err(RecvError::Closed) => return Vec::new(),
                }
            }
        };

        Ok(timeout(self.timeout, wait).await.unwrap_or_default())
    }
}

/// Strip `.properties`, drop blank names and keep the largest id per namespace
fn filter_notifications(notifications: Vec<NotificationRequest>) -> BTreeMap<String, i64> {
    let mut requests = BTreeMap::new();
    for notification in notifications {
        let namespace = normalize_namespace(notification.namespace_name.trim());
        if namespace.is_empty() {
            continue;
        }
        requests
            .entry(namespace.to_string())
            .and_modify(|id: &mut i64| *id = (*id).max(notification.notification_id))
            .or_insert(notification.notification_id);
    }
    requests
}

fn changed_notifications(
    requests: &BTreeMap<String, i64>,
    watched: &BTreeMap<&str, BTreeSet<String>>,
    latest: &[ReleaseMessageInfo],
) -> Vec<ConfigNotification> {
    let mut changed = Vec::new();
    for (namespace, client_id) in requests {
        let Some(keys) = watched.get(namespace.as_str()) else {
            continue;
        };
        let mut messages = NotificationMessages::new();
        let mut latest_id = NOTIFICATION_ID_PLACEHOLDER;
        for message in latest.iter().filter(|m| keys.contains(&m.message)) {
            latest_id = latest_id.max(message.id);
            messages.add(message.message.clone(), message.id);
        }
        if latest_id > *client_id {
            changed.push(ConfigNotification::with_messages(
                namespace.clone(),
                latest_id,
                messages,
            ));
        }
    }
    changed
}

#[async_trait]
impl ReleaseMessageListener for NotificationService {
    fn name(&self) -> &'static str {
        "notification-service"
    }

    async fn handle_message(
        &self,
        message: &ReleaseMessageInfo,
        channel: &str,
    ) -> anyhow::Result<()> {
        if channel != RELEASE_MESSAGE_TOPIC || message.message.is_empty() {
            return Ok(());
        }
        let receivers = self
            .change_sender
            .send(ConfigChangeEvent {
                watched_key: message.message.clone(),
                notification_id: message.id,
            })
            .unwrap_or(0);
        debug!(key = %message.message, receivers, "Notified long polling clients");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_persistence::{MemoryPersistService, ReleaseMessagePersistence};

    fn request(namespace: &str, id: i64) -> NotificationRequest {
        NotificationRequest {
            namespace_name: namespace.to_string(),
            notification_id: id,
        }
    }

    async fn service(store: Arc<MemoryPersistService>, timeout: Duration) -> NotificationService {
        let cache = Arc::new(ReleaseMessageCache::new(
            store,
            Duration::from_secs(1),
            500,
        ));
        cache.initialize().await.unwrap();
        NotificationService::new(cache, timeout)
    }

    #[test]
    fn test_filter_notifications() {
        let requests = filter_notifications(vec![
            request("application.properties", 3),
            request("application", 5),
            request(" ", 1),
            request("db", -1),
        ]);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests["application"], 5);
        assert_eq!(requests["db"], -1);
    }

    #[tokio::test]
    async fn test_outdated_client_answered_immediately() {
        let store = Arc::new(MemoryPersistService::new());
        store.message_create("app1+default+application").await.unwrap();
        let east = store.message_create("app1+east+application").await.unwrap();
        let service = service(store, Duration::from_secs(60)).await;

        let result = service
            .poll_notifications("app1", "east", None, vec![request("application.properties", -1)])
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].namespace_name, "application");
        assert_eq!(result[0].notification_id, east.id);
        let messages = result[0].messages.as_ref().unwrap();
        assert_eq!(messages.details.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_up_to_date_client_times_out_empty() {
        let store = Arc::new(MemoryPersistService::new());
        let current = store.message_create("app1+default+application").await.unwrap();
        let service = service(store, Duration::from_secs(30)).await;

        let result = service
            .poll_notifications("app1", "default", None, vec![request("application", current.id)])
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_waiting_client_woken_by_message() {
        let store = Arc::new(MemoryPersistService::new());
        let service = Arc::new(service(store.clone(), Duration::from_secs(30)).await);

        let poller = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .poll_notifications("app1", "default", Some("dc1"), vec![request("application", -1)])
                    .await
            })
        };
        while service.change_sender.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }

        let unrelated = store.message_create("app1+default+other").await.unwrap();
        service
            .handle_message(&unrelated, RELEASE_MESSAGE_TOPIC)
            .await
            .unwrap();
        let message = store.message_create("app1+dc1+application").await.unwrap();
        service
            .handle_message(&message, RELEASE_MESSAGE_TOPIC)
            .await
            .unwrap();

        let result = poller.await.unwrap().unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].notification_id, message.id);
        assert_eq!(
            result[0].messages.as_ref().unwrap().get("app1+dc1+application"),
            Some(message.id)
        );
    }

    #[tokio::test]
    async fn test_empty_request_rejected() {
        let store = Arc::new(MemoryPersistService::new());
        let service = service(store, Duration::from_secs(1)).await;
        let err = service
            .poll_notifications("app1", "default", None, vec![])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BeaconError>(),
            Some(BeaconError::IllegalArgument(_))
        ));
    }
}
