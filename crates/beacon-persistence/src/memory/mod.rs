//! In-memory persistence backend
//!
//! Keeps every table in `BTreeMap`s behind a single lock, so each trait call is
//! atomic. Used for standalone mode and tests; nothing survives a restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use beacon_common::utils::current_timestamp_ms;

use crate::model::*;
use crate::traits::*;

#[derive(Clone, Debug)]
struct Row<T> {
    value: T,
    is_deleted: bool,
}

impl<T> Row<T> {
    fn live(value: T) -> Self {
        Self {
            value,
            is_deleted: false,
        }
    }
}

#[derive(Default)]
struct Sequences {
    release: i64,
    message: i64,
    gray_rule: i64,
    cluster: i64,
    namespace: i64,
    item: i64,
    lock: i64,
}

fn next(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

#[derive(Default)]
struct MemTables {
    releases: BTreeMap<i64, ReleaseInfo>,
    messages: BTreeMap<i64, ReleaseMessageInfo>,
    gray_rules: BTreeMap<i64, Row<GrayReleaseRuleInfo>>,
    clusters: BTreeMap<i64, ClusterInfo>,
    namespaces: BTreeMap<i64, NamespaceInfo>,
    items: BTreeMap<i64, Row<ItemInfo>>,
    // namespace_id -> lock
    locks: HashMap<i64, NamespaceLockInfo>,
    seq: Sequences,
}

impl MemTables {
    fn append_message(&mut self, message: &str) -> ReleaseMessageInfo {
        let info = ReleaseMessageInfo {
            id: next(&mut self.seq.message),
            message: message.to_string(),
            last_modified_time: current_timestamp_ms(),
        };
        self.messages.insert(info.id, info.clone());
        info
    }

    fn insert_release(&mut self, release: NewRelease) -> ReleaseInfo {
        let info = ReleaseInfo {
            id: next(&mut self.seq.release),
            release_key: release.release_key,
            name: release.name,
            app_id: release.app_id,
            cluster_name: release.cluster_name,
            namespace_name: release.namespace_name,
            configurations: release.configurations,
            comment: release.comment,
            is_abandoned: false,
            created_by: release.operator,
            created_time: current_timestamp_ms(),
        };
        self.releases.insert(info.id, info.clone());
        info
    }

    fn live_rules(&self) -> impl DoubleEndedIterator<Item = &GrayReleaseRuleInfo> {
        self.gray_rules
            .values()
            .filter(|row| !row.is_deleted)
            .map(|row| &row.value)
    }

    fn latest_branch_rule(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
        branch_name: &str,
    ) -> Option<GrayReleaseRuleInfo> {
        self.live_rules()
            .filter(|r| {
                r.app_id == app_id
                    && r.cluster_name == cluster_name
                    && r.namespace_name == namespace_name
                    && r.branch_name == branch_name
            })
            .next_back()
            .cloned()
    }

    fn replace_rule(&mut self, rule: NewGrayReleaseRule) -> GrayReleaseRuleInfo {
        for row in self.gray_rules.values_mut() {
            let r = &row.value;
            if !row.is_deleted
                && r.app_id == rule.app_id
                && r.cluster_name == rule.cluster_name
                && r.namespace_name == rule.namespace_name
                && r.branch_name == rule.branch_name
            {
                row.is_deleted = true;
            }
        }
        let info = GrayReleaseRuleInfo {
            id: next(&mut self.seq.gray_rule),
            app_id: rule.app_id,
            cluster_name: rule.cluster_name,
            namespace_name: rule.namespace_name,
            branch_name: rule.branch_name,
            rules: rule.rules,
            release_id: rule.release_id,
            branch_status: rule.branch_status,
        };
        self.gray_rules.insert(info.id, Row::live(info.clone()));
        info
    }

    fn find_cluster(&self, app_id: &str, name: &str) -> Option<&ClusterInfo> {
        self.clusters
            .values()
            .find(|c| c.app_id == app_id && c.name == name)
    }

    fn find_namespace(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
    ) -> Option<&NamespaceInfo> {
        self.namespaces.values().find(|n| {
            n.app_id == app_id
                && n.cluster_name == cluster_name
                && n.namespace_name == namespace_name
        })
    }
}

/// In-memory `PersistenceService`.
pub struct MemoryPersistService {
    tables: Arc<RwLock<MemTables>>,
    unavailable: AtomicBool,
    read_log: Mutex<Option<Vec<&'static str>>>,
}

impl MemoryPersistService {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(MemTables::default())),
            unavailable: AtomicBool::new(false),
            read_log: Mutex::new(None),
        }
    }

    /// Make every subsequent call fail until switched back, mimicking a store outage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Start recording the release and change log reads served, in call order
    pub fn record_reads(&self) {
        *self.read_log.lock() = Some(Vec::new());
    }

    /// Reads recorded since the last call; empty when not recording
    pub fn take_reads(&self) -> Vec<&'static str> {
        self.read_log
            .lock()
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }

    fn record_read(&self, operation: &'static str) {
        if let Some(log) = self.read_log.lock().as_mut() {
            log.push(operation);
        }
    }

    fn ensure_available(&self) -> anyhow::Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            anyhow::bail!("memory store unavailable");
        }
        Ok(())
    }

    /// Number of change log rows currently retained
    pub fn message_count(&self) -> usize {
        self.tables.read().messages.len()
    }
}

impl Default for MemoryPersistService {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// PersistenceService implementation
// ============================================================================

#[async_trait]
impl PersistenceService for MemoryPersistService {
    fn storage_mode(&self) -> StorageMode {
        StorageMode::Memory
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        self.ensure_available()
    }
}

// ============================================================================
// ReleasePersistence implementation
// ============================================================================

#[async_trait]
impl ReleasePersistence for MemoryPersistService {
    async fn release_find_by_id(&self, id: i64) -> anyhow::Result<Option<ReleaseInfo>> {
        self.ensure_available()?;
        self.record_read("release_find_by_id");
        Ok(self.tables.read().releases.get(&id).cloned())
    }

    async fn release_find_active_by_id(&self, id: i64) -> anyhow::Result<Option<ReleaseInfo>> {
        self.ensure_available()?;
        self.record_read("release_find_active_by_id");
        Ok(self
            .tables
            .read()
            .releases
            .get(&id)
            .filter(|r| !r.is_abandoned)
            .cloned())
    }

    async fn release_find_latest_active(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
    ) -> anyhow::Result<Option<ReleaseInfo>> {
        Ok(self
            .release_find_active(app_id, cluster_name, namespace_name, 1)
            .await?
            .pop())
    }

    async fn release_find_active(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
        limit: u64,
    ) -> anyhow::Result<Vec<ReleaseInfo>> {
        self.ensure_available()?;
        self.record_read("release_find_active");
        self.record_read("release_find_latest_active");
        Ok(self
            .tables
            .read()
            .releases
            .values()
            .rev()
            .filter(|r| {
                !r.is_abandoned
                    && r.app_id == app_id
                    && r.cluster_name == cluster_name
                    && r.namespace_name == namespace_name
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn release_find_active_between(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
        min_id: i64,
        max_id: i64,
    ) -> anyhow::Result<Vec<ReleaseInfo>> {
        self.ensure_available()?;
        self.record_read("release_find_active_between");
        if min_id > max_id {
            return Ok(Vec::new());
        }
        Ok(self
            .tables
            .read()
            .releases
            .range(min_id..=max_id)
            .rev()
            .map(|(_, r)| r)
            .filter(|r| {
                !r.is_abandoned
                    && r.app_id == app_id
                    && r.cluster_name == cluster_name
                    && r.namespace_name == namespace_name
            })
            .cloned()
            .collect())
    }

    async fn release_publish(
        &self,
        release: NewRelease,
        message: &str,
    ) -> anyhow::Result<(ReleaseInfo, ReleaseMessageInfo)> {
        self.ensure_available()?;
        let mut tables = self.tables.write();
        let release = tables.insert_release(release);
        let message = tables.append_message(message);
        Ok((release, message))
    }

    async fn release_publish_branch(
        &self,
        release: NewRelease,
        parent_cluster_name: &str,
        message: &str,
    ) -> anyhow::Result<(ReleaseInfo, Option<GrayReleaseRuleInfo>, ReleaseMessageInfo)> {
        self.ensure_available()?;
        let mut tables = self.tables.write();
        let current_rule = tables.latest_branch_rule(
            &release.app_id,
            parent_cluster_name,
            &release.namespace_name,
            &release.cluster_name,
        );
        let operator = release.operator.clone();
        let release = tables.insert_release(release);
        let rule = current_rule.map(|old| {
            tables.replace_rule(NewGrayReleaseRule {
                app_id: old.app_id,
                cluster_name: old.cluster_name,
                namespace_name: old.namespace_name,
                branch_name: old.branch_name,
                rules: old.rules,
                release_id: release.id,
                branch_status: old.branch_status,
                operator,
            })
        });
        let message = tables.append_message(message);
        Ok((release, rule, message))
    }

    async fn release_abandon(
        &self,
        ids: &[i64],
        _operator: &str,
        message: &str,
    ) -> anyhow::Result<ReleaseMessageInfo> {
        self.ensure_available()?;
        let mut tables = self.tables.write();
        if let Some(missing) = ids.iter().find(|id| !tables.releases.contains_key(id)) {
            anyhow::bail!("release {} not found", missing);
        }
        for id in ids {
            if let Some(release) = tables.releases.get_mut(id) {
                release.is_abandoned = true;
            }
        }
        Ok(tables.append_message(message))
    }
}

// ============================================================================
// ReleaseMessagePersistence implementation
// ============================================================================

#[async_trait]
impl ReleaseMessagePersistence for MemoryPersistService {
    async fn message_create(&self, message: &str) -> anyhow::Result<ReleaseMessageInfo> {
        self.ensure_available()?;
        Ok(self.tables.write().append_message(message))
    }

    async fn message_find_by_id(&self, id: i64) -> anyhow::Result<Option<ReleaseMessageInfo>> {
        self.ensure_available()?;
        self.record_read("message_find_by_id");
        Ok(self.tables.read().messages.get(&id).cloned())
    }

    async fn message_find_max_id(&self) -> anyhow::Result<i64> {
        self.ensure_available()?;
        self.record_read("message_find_max_id");
        Ok(self
            .tables
            .read()
            .messages
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0))
    }

    async fn message_find_after(
        &self,
        after_id: i64,
        limit: u64,
    ) -> anyhow::Result<Vec<ReleaseMessageInfo>> {
        self.ensure_available()?;
        self.record_read("message_find_after");
        Ok(self
            .tables
            .read()
            .messages
            .range(after_id + 1..)
            .take(limit as usize)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn message_find_latest_by_messages(
        &self,
        messages: &[String],
    ) -> anyhow::Result<Option<ReleaseMessageInfo>> {
        self.ensure_available()?;
        self.record_read("message_find_latest_by_messages");
        if messages.is_empty() {
            return Ok(None);
        }
        Ok(self
            .tables
            .read()
            .messages
            .values()
            .rev()
            .find(|m| messages.contains(&m.message))
            .cloned())
    }

    async fn message_find_earlier(
        &self,
        message: &str,
        before_id: i64,
        limit: u64,
    ) -> anyhow::Result<Vec<ReleaseMessageInfo>> {
        self.ensure_available()?;
        self.record_read("message_find_earlier");
        Ok(self
            .tables
            .read()
            .messages
            .range(..before_id)
            .map(|(_, m)| m)
            .filter(|m| m.message == message)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn message_delete_by_ids(&self, ids: &[i64]) -> anyhow::Result<u64> {
        self.ensure_available()?;
        let mut tables = self.tables.write();
        Ok(ids
            .iter()
            .filter(|id| tables.messages.remove(*id).is_some())
            .count() as u64)
    }
}

// ============================================================================
// GrayReleaseRulePersistence implementation
// ============================================================================

#[async_trait]
impl GrayReleaseRulePersistence for MemoryPersistService {
    async fn gray_rule_find_by_namespace(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
    ) -> anyhow::Result<Vec<GrayReleaseRuleInfo>> {
        self.ensure_available()?;
        Ok(self
            .tables
            .read()
            .live_rules()
            .filter(|r| {
                r.app_id == app_id
                    && r.cluster_name == cluster_name
                    && r.namespace_name == namespace_name
            })
            .cloned()
            .collect())
    }

    async fn gray_rule_find_latest_by_branch(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
        branch_name: &str,
    ) -> anyhow::Result<Option<GrayReleaseRuleInfo>> {
        self.ensure_available()?;
        Ok(self
            .tables
            .read()
            .latest_branch_rule(app_id, cluster_name, namespace_name, branch_name))
    }

    async fn gray_rule_find_after(
        &self,
        after_id: i64,
        limit: u64,
    ) -> anyhow::Result<Vec<GrayReleaseRuleInfo>> {
        self.ensure_available()?;
        Ok(self
            .tables
            .read()
            .live_rules()
            .filter(|r| r.id > after_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn gray_rule_replace(
        &self,
        rule: NewGrayReleaseRule,
        message: &str,
    ) -> anyhow::Result<(GrayReleaseRuleInfo, ReleaseMessageInfo)> {
        self.ensure_available()?;
        let mut tables = self.tables.write();
        let rule = tables.replace_rule(rule);
        let message = tables.append_message(message);
        Ok((rule, message))
    }
}

// ============================================================================
// NamespacePersistence implementation
// ============================================================================

#[async_trait]
impl NamespacePersistence for MemoryPersistService {
    async fn cluster_create(
        &self,
        app_id: &str,
        name: &str,
        parent_cluster_id: i64,
        _operator: &str,
    ) -> anyhow::Result<ClusterInfo> {
        self.ensure_available()?;
        let mut tables = self.tables.write();
        if let Some(existing) = tables.find_cluster(app_id, name) {
            anyhow::bail!("cluster {} of app {} already exists", existing.name, app_id);
        }
        let info = ClusterInfo {
            id: next(&mut tables.seq.cluster),
            app_id: app_id.to_string(),
            name: name.to_string(),
            parent_cluster_id,
        };
        tables.clusters.insert(info.id, info.clone());
        Ok(info)
    }

    async fn cluster_delete(&self, id: i64, _operator: &str) -> anyhow::Result<bool> {
        self.ensure_available()?;
        let mut tables = self.tables.write();
        let Some(cluster) = tables.clusters.remove(&id) else {
            return Ok(false);
        };
        let removed: Vec<i64> = tables
            .namespaces
            .values()
            .filter(|n| n.app_id == cluster.app_id && n.cluster_name == cluster.name)
            .map(|n| n.id)
            .collect();
        for namespace_id in removed {
            tables.namespaces.remove(&namespace_id);
            tables.locks.remove(&namespace_id);
        }
        Ok(true)
    }

    async fn cluster_find(&self, app_id: &str, name: &str) -> anyhow::Result<Option<ClusterInfo>> {
        self.ensure_available()?;
        Ok(self.tables.read().find_cluster(app_id, name).cloned())
    }

    async fn cluster_find_by_id(&self, id: i64) -> anyhow::Result<Option<ClusterInfo>> {
        self.ensure_available()?;
        Ok(self.tables.read().clusters.get(&id).cloned())
    }

    async fn cluster_find_children(
        &self,
        app_id: &str,
        parent_cluster_id: i64,
    ) -> anyhow::Result<Vec<ClusterInfo>> {
        self.ensure_available()?;
        Ok(self
            .tables
            .read()
            .clusters
            .values()
            .filter(|c| c.app_id == app_id && c.parent_cluster_id == parent_cluster_id)
            .cloned()
            .collect())
    }

    async fn namespace_create(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
        _operator: &str,
    ) -> anyhow::Result<NamespaceInfo> {
        self.ensure_available()?;
        let mut tables = self.tables.write();
        if tables
            .find_namespace(app_id, cluster_name, namespace_name)
            .is_some()
        {
            anyhow::bail!(
                "namespace {}+{}+{} already exists",
                app_id,
                cluster_name,
                namespace_name
            );
        }
        let info = NamespaceInfo {
            id: next(&mut tables.seq.namespace),
            app_id: app_id.to_string(),
            cluster_name: cluster_name.to_string(),
            namespace_name: namespace_name.to_string(),
        };
        tables.namespaces.insert(info.id, info.clone());
        Ok(info)
    }

    async fn namespace_find(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
    ) -> anyhow::Result<Option<NamespaceInfo>> {
        self.ensure_available()?;
        Ok(self
            .tables
            .read()
            .find_namespace(app_id, cluster_name, namespace_name)
            .cloned())
    }

    async fn namespace_find_by_id(&self, id: i64) -> anyhow::Result<Option<NamespaceInfo>> {
        self.ensure_available()?;
        Ok(self.tables.read().namespaces.get(&id).cloned())
    }

    async fn namespace_find_parent(
        &self,
        namespace: &NamespaceInfo,
    ) -> anyhow::Result<Option<NamespaceInfo>> {
        self.ensure_available()?;
        let tables = self.tables.read();
        let Some(cluster) = tables.find_cluster(&namespace.app_id, &namespace.cluster_name) else {
            return Ok(None);
        };
        if cluster.parent_cluster_id == 0 {
            return Ok(None);
        }
        let Some(parent) = tables.clusters.get(&cluster.parent_cluster_id) else {
            return Ok(None);
        };
        Ok(tables
            .find_namespace(&namespace.app_id, &parent.name, &namespace.namespace_name)
            .cloned())
    }
}

// ============================================================================
// ItemPersistence implementation
// ============================================================================

#[async_trait]
impl ItemPersistence for MemoryPersistService {
    async fn item_find_by_namespace(&self, namespace_id: i64) -> anyhow::Result<Vec<ItemInfo>> {
        self.ensure_available()?;
        let mut items: Vec<ItemInfo> = self
            .tables
            .read()
            .items
            .values()
            .filter(|row| !row.is_deleted && row.value.namespace_id == namespace_id)
            .map(|row| row.value.clone())
            .collect();
        items.sort_by_key(|item| (item.line_num, item.id));
        Ok(items)
    }

    async fn item_find_by_id(&self, id: i64) -> anyhow::Result<Option<ItemInfo>> {
        self.ensure_available()?;
        Ok(self
            .tables
            .read()
            .items
            .get(&id)
            .filter(|row| !row.is_deleted)
            .map(|row| row.value.clone()))
    }

    async fn item_find_by_key(
        &self,
        namespace_id: i64,
        key: &str,
    ) -> anyhow::Result<Option<ItemInfo>> {
        self.ensure_available()?;
        Ok(self
            .tables
            .read()
            .items
            .values()
            .find(|row| {
                !row.is_deleted && row.value.namespace_id == namespace_id && row.value.key == key
            })
            .map(|row| row.value.clone()))
    }

    async fn item_create(
        &self,
        namespace_id: i64,
        item: NewItem,
        operator: &str,
    ) -> anyhow::Result<ItemInfo> {
        self.ensure_available()?;
        let mut tables = self.tables.write();
        let info = ItemInfo {
            id: next(&mut tables.seq.item),
            namespace_id,
            key: item.key,
            value: item.value,
            comment: item.comment,
            line_num: item.line_num,
            last_modified_by: operator.to_string(),
        };
        tables.items.insert(info.id, Row::live(info.clone()));
        Ok(info)
    }

    async fn item_update(
        &self,
        id: i64,
        value: &str,
        comment: &str,
        operator: &str,
    ) -> anyhow::Result<Option<ItemInfo>> {
        self.ensure_available()?;
        let mut tables = self.tables.write();
        Ok(match tables.items.get_mut(&id) {
            Some(row) if !row.is_deleted => {
                row.value.value = value.to_string();
                row.value.comment = comment.to_string();
                row.value.last_modified_by = operator.to_string();
                Some(row.value.clone())
            }
            _ => None,
        })
    }

    async fn item_delete(&self, id: i64, operator: &str) -> anyhow::Result<bool> {
        self.ensure_available()?;
        let mut tables = self.tables.write();
        Ok(match tables.items.get_mut(&id) {
            Some(row) if !row.is_deleted => {
                row.is_deleted = true;
                row.value.last_modified_by = operator.to_string();
                true
            }
            _ => false,
        })
    }
}

// ============================================================================
// NamespaceLockPersistence implementation
// ============================================================================

#[async_trait]
impl NamespaceLockPersistence for MemoryPersistService {
    async fn lock_find(&self, namespace_id: i64) -> anyhow::Result<Option<NamespaceLockInfo>> {
        self.ensure_available()?;
        Ok(self.tables.read().locks.get(&namespace_id).cloned())
    }

    async fn lock_try_insert(
        &self,
        namespace_id: i64,
        owner: &str,
    ) -> anyhow::Result<LockInsertOutcome> {
        self.ensure_available()?;
        let mut tables = self.tables.write();
        if tables.locks.contains_key(&namespace_id) {
            return Ok(LockInsertOutcome::Conflict);
        }
        let info = NamespaceLockInfo {
            id: next(&mut tables.seq.lock),
            namespace_id,
            locked_by: owner.to_string(),
            created_time: current_timestamp_ms(),
        };
        tables.locks.insert(namespace_id, info.clone());
        Ok(LockInsertOutcome::Acquired(info))
    }

    async fn lock_delete(&self, namespace_id: i64) -> anyhow::Result<bool> {
        self.ensure_available()?;
        Ok(self.tables.write().locks.remove(&namespace_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_release(cluster: &str, key: &str) -> NewRelease {
        NewRelease {
            release_key: key.to_string(),
            name: key.to_string(),
            app_id: "app1".to_string(),
            cluster_name: cluster.to_string(),
            namespace_name: "application".to_string(),
            configurations: "{}".to_string(),
            comment: String::new(),
            operator: "alice".to_string(),
        }
    }

    #[tokio::test]
    async fn test_message_ids_never_reused() {
        let store = MemoryPersistService::new();
        let first = store.message_create("a+default+ns").await.unwrap();
        let second = store.message_create("a+default+ns").await.unwrap();
        assert_eq!(store.message_delete_by_ids(&[first.id, second.id]).await.unwrap(), 2);

        let third = store.message_create("a+default+ns").await.unwrap();
        assert!(third.id > second.id);
        assert_eq!(store.message_find_max_id().await.unwrap(), third.id);
    }

    #[tokio::test]
    async fn test_message_find_after_and_earlier() {
        let store = MemoryPersistService::new();
        for key in ["k1", "k2", "k1", "k1"] {
            store.message_create(key).await.unwrap();
        }

        let after = store.message_find_after(1, 2).await.unwrap();
        assert_eq!(after.iter().map(|m| m.id).collect::<Vec<_>>(), vec![2, 3]);

        let earlier = store.message_find_earlier("k1", 4, 10).await.unwrap();
        assert_eq!(earlier.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1, 3]);

        let latest = store
            .message_find_latest_by_messages(&["k1".to_string(), "k2".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, 4);
    }

    #[tokio::test]
    async fn test_latest_active_release_skips_abandoned() {
        let store = MemoryPersistService::new();
        let (r1, _) = store
            .release_publish(new_release("default", "r1"), "app1+default+application")
            .await
            .unwrap();
        let (r2, _) = store
            .release_publish(new_release("default", "r2"), "app1+default+application")
            .await
            .unwrap();

        let latest = store
            .release_find_latest_active("app1", "default", "application")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, r2.id);

        store
            .release_abandon(&[r2.id], "alice", "app1+default+application")
            .await
            .unwrap();
        let latest = store
            .release_find_latest_active("app1", "default", "application")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, r1.id);
        assert!(store.release_find_active_by_id(r2.id).await.unwrap().is_none());
        assert!(store.release_find_by_id(r2.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_abandon_range_is_atomic() {
        let store = MemoryPersistService::new();
        let mut ids = Vec::new();
        for name in ["r1", "r2", "r3"] {
            let (release, _) = store
                .release_publish(new_release("default", name), "app1+default+application")
                .await
                .unwrap();
            ids.push(release.id);
        }

        let between = store
            .release_find_active_between("app1", "default", "application", ids[1], ids[2])
            .await
            .unwrap();
        assert_eq!(between.iter().map(|r| r.id).collect::<Vec<_>>(), vec![ids[2], ids[1]]);

        assert!(
            store
                .release_abandon(&[ids[2], 999], "alice", "app1+default+application")
                .await
                .is_err()
        );
        assert!(store.release_find_active_by_id(ids[2]).await.unwrap().is_some());

        store
            .release_abandon(&ids[1..], "alice", "app1+default+application")
            .await
            .unwrap();
        let latest = store
            .release_find_latest_active("app1", "default", "application")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, ids[0]);
    }

    #[tokio::test]
    async fn test_gray_rule_replace_soft_deletes_previous() {
        let store = MemoryPersistService::new();
        let rule = NewGrayReleaseRule {
            app_id: "app1".to_string(),
            cluster_name: "default".to_string(),
            namespace_name: "application".to_string(),
            branch_name: "branch-1".to_string(),
            rules: "[]".to_string(),
            release_id: 1,
            branch_status: 1,
            operator: "alice".to_string(),
        };
        let (first, _) = store
            .gray_rule_replace(rule.clone(), "app1+default+application")
            .await
            .unwrap();
        let (second, _) = store
            .gray_rule_replace(rule, "app1+default+application")
            .await
            .unwrap();

        assert!(second.id > first.id);
        let rules = store
            .gray_rule_find_by_namespace("app1", "default", "application")
            .await
            .unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, second.id);
        assert_eq!(store.message_count(), 2);
    }

    #[tokio::test]
    async fn test_branch_publish_refreshes_rule_release_id() {
        let store = MemoryPersistService::new();
        store
            .gray_rule_replace(
                NewGrayReleaseRule {
                    app_id: "app1".to_string(),
                    cluster_name: "default".to_string(),
                    namespace_name: "application".to_string(),
                    branch_name: "branch-1".to_string(),
                    rules: r#"[{"clientAppId":"y","clientIpList":["*"]}]"#.to_string(),
                    release_id: 0,
                    branch_status: 1,
                    operator: "alice".to_string(),
                },
                "app1+default+application",
            )
            .await
            .unwrap();

        let (release, rule, _) = store
            .release_publish_branch(
                new_release("branch-1", "gray"),
                "default",
                "app1+default+application",
            )
            .await
            .unwrap();
        let rule = rule.unwrap();
        assert_eq!(rule.release_id, release.id);
        assert!(rule.rules.contains("clientAppId"));
    }

    #[tokio::test]
    async fn test_lock_insert_conflict() {
        let store = MemoryPersistService::new();
        assert!(matches!(
            store.lock_try_insert(1, "alice").await.unwrap(),
            LockInsertOutcome::Acquired(_)
        ));
        assert_eq!(
            store.lock_try_insert(1, "bob").await.unwrap(),
            LockInsertOutcome::Conflict
        );
        assert!(store.lock_delete(1).await.unwrap());
        assert!(!store.lock_delete(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_namespace_parent_lookup() {
        let store = MemoryPersistService::new();
        let parent = store.cluster_create("app1", "default", 0, "alice").await.unwrap();
        store
            .cluster_create("app1", "branch-1", parent.id, "alice")
            .await
            .unwrap();
        let parent_ns = store
            .namespace_create("app1", "default", "application", "alice")
            .await
            .unwrap();
        let child_ns = store
            .namespace_create("app1", "branch-1", "application", "alice")
            .await
            .unwrap();

        assert_eq!(
            store.namespace_find_parent(&child_ns).await.unwrap(),
            Some(parent_ns.clone())
        );
        assert_eq!(store.namespace_find_parent(&parent_ns).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = MemoryPersistService::new();
        store.set_unavailable(true);
        assert!(store.message_find_max_id().await.is_err());
        assert!(store.health_check().await.is_err());
        store.set_unavailable(false);
        assert_eq!(store.message_find_max_id().await.unwrap(), 0);
    }
}
