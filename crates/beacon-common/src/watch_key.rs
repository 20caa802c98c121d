//! Watch keys
//!
//! A watch key identifies one (appId, cluster, namespace) triple on the change
//! log. Format: `{appId}+{cluster}+{namespace}`.

use std::collections::BTreeSet;

use crate::constants::{CLUSTER_NAMESPACE_SEPARATOR, DEFAULT_CLUSTER_NAME, NO_APPID_PLACEHOLDER};

/// Assemble the watch key string for a triple
pub fn assemble_watch_key(app_id: &str, cluster: &str, namespace: &str) -> String {
    [app_id, cluster, namespace].join(CLUSTER_NAMESPACE_SEPARATOR)
}

/// Parsed form of a watch key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchKey {
    pub app_id: String,
    pub cluster: String,
    pub namespace: String,
}

impl WatchKey {
    pub fn new(app_id: &str, cluster: &str, namespace: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            cluster: cluster.to_string(),
            namespace: namespace.to_string(),
        }
    }

    /// Parse from `{appId}+{cluster}+{namespace}`.
    ///
    /// Empty segments are dropped before counting, so `a++b+c` parses while
    /// `a+b` and `a+b+c+d` do not.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s
            .split(CLUSTER_NAMESPACE_SEPARATOR)
            .filter(|part| !part.is_empty())
            .collect();
        match parts.as_slice() {
            [app_id, cluster, namespace] => Some(Self::new(app_id, cluster, namespace)),
            _ => None,
        }
    }

    pub fn to_key_string(&self) -> String {
        assemble_watch_key(&self.app_id, &self.cluster, &self.namespace)
    }
}

impl std::fmt::Display for WatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_key_string())
    }
}

/// Keys a client of `cluster` in `data_center` must watch for `namespace`.
///
/// The named cluster comes first when it is not the default one, then the data
/// center when it differs from the cluster, and finally the default cluster.
pub fn assemble_all_watch_keys(
    app_id: &str,
    cluster: &str,
    namespace: &str,
    data_center: Option<&str>,
) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    if app_id == NO_APPID_PLACEHOLDER {
        return keys;
    }

    if cluster != DEFAULT_CLUSTER_NAME {
        keys.insert(assemble_watch_key(app_id, cluster, namespace));
    }

    if let Some(dc) = data_center
        && !dc.is_empty()
        && dc != cluster
    {
        keys.insert(assemble_watch_key(app_id, dc, namespace));
    }

    keys.insert(assemble_watch_key(app_id, DEFAULT_CLUSTER_NAME, namespace));
    keys
}
