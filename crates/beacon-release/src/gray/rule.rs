//! Gray release rule items and cached rule entries

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use beacon_common::constants::ALL_IP;

/// Lifecycle of a gray branch as recorded on its rule rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum BranchStatus {
    Deleted = 0,
    Active = 1,
    /// Fully released into the parent
    Merged = 2,
}

impl BranchStatus {
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(BranchStatus::Deleted),
            1 => Some(BranchStatus::Active),
            2 => Some(BranchStatus::Merged),
            _ => None,
        }
    }

    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

/// One targeting entry of a gray rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrayReleaseRuleItem {
    pub client_app_id: String,
    #[serde(default)]
    pub client_ip_list: BTreeSet<String>,
}

impl GrayReleaseRuleItem {
    pub fn new(client_app_id: &str, client_ips: &[&str]) -> Self {
        Self {
            client_app_id: client_app_id.to_string(),
            client_ip_list: client_ips.iter().map(|ip| ip.to_string()).collect(),
        }
    }

    /// App ids compare case-insensitively; a `*` entry matches any IP,
    /// including an unknown one
    pub fn matches(&self, client_app_id: &str, client_ip: Option<&str>) -> bool {
        self.client_app_id.eq_ignore_ascii_case(client_app_id) && self.matches_ip(client_ip)
    }

    fn matches_ip(&self, client_ip: Option<&str>) -> bool {
        self.client_ip_list.contains(ALL_IP)
            || client_ip.is_some_and(|ip| self.client_ip_list.contains(ip))
    }
}

/// Decode a rule payload
pub fn parse_rule_items(rules: &str) -> anyhow::Result<Vec<GrayReleaseRuleItem>> {
    if rules.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(rules)?)
}

/// Cached form of a gray rule row
#[derive(Debug)]
pub struct GrayReleaseRuleCache {
    pub rule_id: i64,
    pub branch_name: String,
    pub namespace_name: String,
    pub release_id: i64,
    pub branch_status: i16,
    pub rule_items: Vec<GrayReleaseRuleItem>,
    load_version: AtomicI64,
}

impl GrayReleaseRuleCache {
    pub fn new(
        rule_id: i64,
        branch_name: String,
        namespace_name: String,
        release_id: i64,
        branch_status: i16,
        rule_items: Vec<GrayReleaseRuleItem>,
        load_version: i64,
    ) -> Self {
        Self {
            rule_id,
            branch_name,
            namespace_name,
            release_id,
            branch_status,
            rule_items,
            load_version: AtomicI64::new(load_version),
        }
    }

    pub fn is_active(&self) -> bool {
        self.branch_status == BranchStatus::Active.as_i16()
    }

    pub fn load_version(&self) -> i64 {
        self.load_version.load(Ordering::SeqCst)
    }

    pub fn set_load_version(&self, version: i64) {
        self.load_version.store(version, Ordering::SeqCst);
    }

    pub fn matches(&self, client_app_id: &str, client_ip: Option<&str>) -> bool {
        self.rule_items
            .iter()
            .any(|item| item.matches(client_app_id, client_ip))
    }
}
