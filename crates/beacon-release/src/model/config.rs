//! Config query responses

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use beacon_persistence::ReleaseInfo;

/// Response of `/configs/{appId}/{cluster}/{namespace}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub app_id: String,

    /// Cluster of the release actually served
    pub cluster: String,

    pub namespace_name: String,

    /// Release key of the served release
    pub release_key: String,

    pub configurations: HashMap<String, String>,
}

impl ConfigResponse {
    pub fn from_release(
        app_id: &str,
        namespace_name: &str,
        release: &ReleaseInfo,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            app_id: app_id.to_string(),
            cluster: release.cluster_name.clone(),
            namespace_name: namespace_name.to_string(),
            release_key: release.release_key.clone(),
            configurations: release.configuration_map()?,
        })
    }
}

/// Identity of the client asking for configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientIdentity {
    pub app_id: String,
    pub ip: Option<String>,
    pub data_center: Option<String>,
}

impl ClientIdentity {
    pub fn new(app_id: &str, ip: Option<&str>, data_center: Option<&str>) -> Self {
        Self {
            app_id: app_id.to_string(),
            ip: ip.filter(|s| !s.is_empty()).map(str::to_string),
            data_center: data_center.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    pub fn data_center(&self) -> Option<&str> {
        self.data_center.as_deref()
    }
}
