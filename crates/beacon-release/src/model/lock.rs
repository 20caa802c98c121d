//! Namespace lock models

use serde::{Deserialize, Serialize};

/// Lock state of one namespace as shown to editors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceLockStatus {
    pub namespace_name: String,
    pub is_locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
}

impl NamespaceLockStatus {
    pub fn unlocked(namespace_name: &str) -> Self {
        Self {
            namespace_name: namespace_name.to_string(),
            is_locked: false,
            locked_by: None,
        }
    }

    pub fn locked(namespace_name: &str, owner: &str) -> Self {
        Self {
            namespace_name: namespace_name.to_string(),
            is_locked: true,
            locked_by: Some(owner.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlocked_omits_owner() {
        let json = serde_json::to_string(&NamespaceLockStatus::unlocked("application")).unwrap();
        assert_eq!(json, r#"{"namespaceName":"application","isLocked":false}"#);

        let json = serde_json::to_string(&NamespaceLockStatus::locked("application", "alice")).unwrap();
        assert!(json.contains(r#""lockedBy":"alice""#));
    }
}
