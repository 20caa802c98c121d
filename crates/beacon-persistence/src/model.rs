//! Domain model types for the persistence abstraction layer
//!
//! These types are used as arguments and return values of the persistence
//! traits, decoupled from specific storage backends.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Release row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    pub id: i64,
    pub release_key: String,
    pub name: String,
    pub app_id: String,
    pub cluster_name: String,
    pub namespace_name: String,
    /// JSON object of key to value
    pub configurations: String,
    pub comment: String,
    pub is_abandoned: bool,
    pub created_by: String,
    pub created_time: i64,
}

impl ReleaseInfo {
    /// Decode the configurations payload
    pub fn configuration_map(&self) -> anyhow::Result<HashMap<String, String>> {
        if self.configurations.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&self.configurations)?)
    }
}

/// Values for a release about to be written
#[derive(Clone, Debug, Default)]
pub struct NewRelease {
    pub release_key: String,
    pub name: String,
    pub app_id: String,
    pub cluster_name: String,
    pub namespace_name: String,
    pub configurations: String,
    pub comment: String,
    pub operator: String,
}

/// Change log row. `message` holds the watch key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseMessageInfo {
    pub id: i64,
    pub message: String,
    pub last_modified_time: i64,
}

/// Gray release rule row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrayReleaseRuleInfo {
    pub id: i64,
    pub app_id: String,
    pub cluster_name: String,
    pub namespace_name: String,
    pub branch_name: String,
    /// JSON array of `{clientAppId, clientIpList}`
    pub rules: String,
    pub release_id: i64,
    pub branch_status: i16,
}

/// Values for a gray rule row about to be written
#[derive(Clone, Debug, Default)]
pub struct NewGrayReleaseRule {
    pub app_id: String,
    pub cluster_name: String,
    pub namespace_name: String,
    pub branch_name: String,
    pub rules: String,
    pub release_id: i64,
    pub branch_status: i16,
    pub operator: String,
}

/// Cluster row. A non-zero `parent_cluster_id` marks a gray branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub id: i64,
    pub app_id: String,
    pub name: String,
    pub parent_cluster_id: i64,
}

/// Namespace row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceInfo {
    pub id: i64,
    pub app_id: String,
    pub cluster_name: String,
    pub namespace_name: String,
}

impl NamespaceInfo {
    /// `appId+cluster+namespace`, used in lock messages
    pub fn display_key(&self) -> String {
        beacon_common::assemble_watch_key(&self.app_id, &self.cluster_name, &self.namespace_name)
    }
}

/// Item row. A blank key marks a comment or empty line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInfo {
    pub id: i64,
    pub namespace_id: i64,
    pub key: String,
    pub value: String,
    pub comment: String,
    pub line_num: i32,
    pub last_modified_by: String,
}

impl ItemInfo {
    pub fn has_key(&self) -> bool {
        !self.key.trim().is_empty()
    }
}

/// Values for an item about to be created
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub line_num: i32,
}

/// Namespace lock row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceLockInfo {
    pub id: i64,
    pub namespace_id: i64,
    pub locked_by: String,
    pub created_time: i64,
}

/// Outcome of an optimistic lock insert
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockInsertOutcome {
    Acquired(NamespaceLockInfo),
    /// Another row already holds the namespace
    Conflict,
}

/// Storage mode for the persistence layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMode {
    /// External database (MySQL/PostgreSQL via SeaORM)
    ExternalDb,
    /// In-process tables, lost on restart
    Memory,
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::ExternalDb => write!(f, "external_db"),
            StorageMode::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "external_db" => Ok(StorageMode::ExternalDb),
            "memory" => Ok(StorageMode::Memory),
            _ => Err(format!("Invalid storage mode: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_mode_parse() {
        assert_eq!("memory".parse::<StorageMode>(), Ok(StorageMode::Memory));
        assert_eq!(
            "external_db".parse::<StorageMode>(),
            Ok(StorageMode::ExternalDb)
        );
        assert!("rocksdb".parse::<StorageMode>().is_err());
        assert_eq!(StorageMode::Memory.to_string(), "memory");
    }

    #[test]
    fn test_release_configuration_map() {
        let mut release = ReleaseInfo {
            id: 1,
            release_key: "k".to_string(),
            name: "r1".to_string(),
            app_id: "app1".to_string(),
            cluster_name: "default".to_string(),
            namespace_name: "application".to_string(),
            configurations: r#"{"timeout":"100"}"#.to_string(),
            comment: String::new(),
            is_abandoned: false,
            created_by: "alice".to_string(),
            created_time: 0,
        };
        let map = release.configuration_map().unwrap();
        assert_eq!(map.get("timeout").map(String::as_str), Some("100"));

        release.configurations = String::new();
        assert!(release.configuration_map().unwrap().is_empty());

        release.configurations = "not json".to_string();
        assert!(release.configuration_map().is_err());
    }
}
