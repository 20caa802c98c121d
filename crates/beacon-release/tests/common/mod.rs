//! Shared fixtures for release engine integration tests

#![allow(dead_code)]

use std::sync::Arc;

use beacon_persistence::{
    MemoryPersistService, NamespaceInfo, NamespacePersistence, NewItem, PersistenceService,
};
use beacon_release::{ReleaseEngine, ReleaseEngineConfig};

pub const APP_ID: &str = "app1";
pub const NAMESPACE: &str = "application";
pub const EDITOR: &str = "alice";
pub const PUBLISHER: &str = "bob";

pub struct TestEngine {
    pub store: Arc<MemoryPersistService>,
    pub engine: ReleaseEngine,
}

impl TestEngine {
    /// Drive one scanner pass instead of waiting on the background loop
    pub async fn scan(&self) -> usize {
        self.engine.message_scanner().scan_messages().await.unwrap()
    }

    pub async fn add_item(&self, cluster: &str, key: &str, value: &str, operator: &str) {
        let item = NewItem {
            key: key.to_string(),
            value: value.to_string(),
            ..Default::default()
        };
        self.engine
            .item_service()
            .create_item(APP_ID, cluster, NAMESPACE, item, operator)
            .await
            .unwrap();
    }

    pub async fn update_first_item(&self, cluster: &str, value: &str) {
        let items = self
            .engine
            .item_service()
            .find_items(APP_ID, cluster, NAMESPACE)
            .await
            .unwrap();
        self.engine
            .item_service()
            .update_item(items[0].id, value, "", EDITOR)
            .await
            .unwrap();
    }

    pub async fn publish(&self, cluster: &str, operator: &str) -> i64 {
        self.engine
            .release_service()
            .publish(APP_ID, cluster, NAMESPACE, "", "", operator, false)
            .await
            .unwrap()
            .id
    }
}

/// Engine over a fresh memory store holding `app1` with the given root
/// clusters, each carrying an `application` namespace
pub async fn engine_with(clusters: &[&str], config: ReleaseEngineConfig) -> TestEngine {
    let store = Arc::new(MemoryPersistService::new());
    for cluster in clusters {
        seed_namespace(&store, cluster).await;
    }
    let persistence: Arc<dyn PersistenceService> = store.clone();
    let engine = ReleaseEngine::bootstrap(persistence, config).await.unwrap();
    TestEngine { store, engine }
}

pub async fn engine(clusters: &[&str]) -> TestEngine {
    engine_with(clusters, ReleaseEngineConfig::default()).await
}

pub async fn seed_namespace(store: &MemoryPersistService, cluster: &str) -> NamespaceInfo {
    store.cluster_create(APP_ID, cluster, 0, EDITOR).await.unwrap();
    store
        .namespace_create(APP_ID, cluster, NAMESPACE, EDITOR)
        .await
        .unwrap()
}

pub fn value_of(release: &beacon_persistence::ReleaseInfo, key: &str) -> Option<String> {
    release.configuration_map().unwrap().get(key).cloned()
}
