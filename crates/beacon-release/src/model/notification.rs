//! Long polling notification models

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One entry of a `/notifications/v2` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigNotification {
    pub namespace_name: String,

    /// Id of the newest change log row among the namespace's watch keys
    pub notification_id: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<NotificationMessages>,
}

impl ConfigNotification {
    pub fn new(namespace_name: String, notification_id: i64) -> Self {
        Self {
            namespace_name,
            notification_id,
            messages: None,
        }
    }

    pub fn with_messages(
        namespace_name: String,
        notification_id: i64,
        messages: NotificationMessages,
    ) -> Self {
        Self {
            namespace_name,
            notification_id,
            messages: Some(messages),
        }
    }
}

/// Watch key to notification id, echoed back by clients as a freshness hint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessages {
    #[serde(default)]
    pub details: HashMap<String, i64>,
}

impl NotificationMessages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: String, notification_id: i64) {
        self.details.insert(key, notification_id);
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.details.get(key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    /// Keep the larger id per key
    pub fn merge(&mut self, other: NotificationMessages) {
        for (key, id) in other.details {
            self.details
                .entry(key)
                .and_modify(|e| {
                    if id > *e {
                        *e = id;
                    }
                })
                .or_insert(id);
        }
    }

    /// Decode the `messages` query parameter; malformed input yields `None`
    pub fn from_query(raw: Option<&str>) -> Option<Self> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }
        serde_json::from_str(raw).ok()
    }
}

/// One namespace a long polling client is waiting on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub namespace_name: String,

    /// Client's current notification id, -1 on first request
    pub notification_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_serialization() {
        let notification = ConfigNotification::new("application".to_string(), 100);
        let json = serde_json::to_string(&notification).unwrap();
        assert!(json.contains("namespaceName"));
        assert!(json.contains("notificationId"));
        assert!(!json.contains("messages"));
    }

    #[test]
    fn test_messages_merge_keeps_larger_id() {
        let mut messages = NotificationMessages::new();
        messages.add("app1+default+application".to_string(), 10);

        let mut other = NotificationMessages::new();
        other.add("app1+default+application".to_string(), 5);
        other.add("app1+east+application".to_string(), 7);
        messages.merge(other);

        assert_eq!(messages.get("app1+default+application"), Some(10));
        assert_eq!(messages.get("app1+east+application"), Some(7));
    }

    #[test]
    fn test_messages_from_query() {
        let parsed =
            NotificationMessages::from_query(Some(r#"{"details":{"app1+default+application":3}}"#))
                .unwrap();
        assert_eq!(parsed.get("app1+default+application"), Some(3));
        assert!(NotificationMessages::from_query(Some("not json")).is_none());
        assert!(NotificationMessages::from_query(None).is_none());
    }
}
