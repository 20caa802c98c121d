//! In-process gray rule index

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use beacon_common::constants::{ALL_IP, RELEASE_MESSAGE_TOPIC};
use beacon_common::{WatchKey, assemble_watch_key};
use beacon_persistence::{GrayReleaseRuleInfo, PersistenceService, ReleaseMessageInfo};

use super::rule::{GrayReleaseRuleCache, parse_rule_items};
use crate::message::ReleaseMessageListener;

/// Index of gray rules.
///
/// The forward map goes from a lower-cased watch key to the cached rules of
/// that namespace, keyed by rule id. The reverse map goes from a lower-cased
/// `clientAppId + namespace + ip` to the ids of active rules targeting it, so
/// the "does this client have any gray rule" check is a single lookup.
///
/// Every full scan bumps a generation counter. Active rules re-seen by a scan
/// take the current generation; an inactive rule is evicted once it is more
/// than one generation behind.
pub struct GrayReleaseRulesHolder {
    persistence: Arc<dyn PersistenceService>,
    gray_release_rule_cache: DashMap<String, BTreeMap<i64, Arc<GrayReleaseRuleCache>>>,
    reversed_gray_release_rule_cache: DashMap<String, BTreeSet<i64>>,
    load_version: AtomicI64,
    scan_interval: Duration,
    batch_size: u64,
}

impl GrayReleaseRulesHolder {
    pub fn new(
        persistence: Arc<dyn PersistenceService>,
        scan_interval: Duration,
        batch_size: u64,
    ) -> Self {
        Self {
            persistence,
            gray_release_rule_cache: DashMap::new(),
            reversed_gray_release_rule_cache: DashMap::new(),
            load_version: AtomicI64::new(0),
            scan_interval,
            batch_size: batch_size.max(1),
        }
    }

    pub fn load_version(&self) -> i64 {
        self.load_version.load(Ordering::SeqCst)
    }

    /// Run the first full scan
    pub async fn initialize(&self) -> anyhow::Result<()> {
        self.periodic_scan_rules().await?;
        info!(
            namespaces = self.gray_release_rule_cache.len(),
            "Gray release rules loaded"
        );
        Ok(())
    }

    /// Release id a client should see for the namespace, if an active rule
    /// with a non-zero release targets it
    pub fn find_release_id_from_gray_release_rule(
        &self,
        client_app_id: &str,
        client_ip: Option<&str>,
        config_app_id: &str,
        config_cluster: &str,
        config_namespace: &str,
    ) -> Option<i64> {
        let key = rule_key(config_app_id, config_cluster, config_namespace);
        let rules: Vec<Arc<GrayReleaseRuleCache>> = match self.gray_release_rule_cache.get(&key)
        {
            Some(rules) => rules.values().cloned().collect(),
            None => return None,
        };

        rules
            .iter()
            .filter(|rule| rule.is_active() && rule.release_id > 0)
            .find(|rule| rule.matches(client_app_id, client_ip))
            .map(|rule| rule.release_id)
    }

    /// Cheap check used to bypass whole-result caches for gray clients
    pub fn has_gray_release_rule(
        &self,
        client_app_id: &str,
        client_ip: Option<&str>,
        namespace: &str,
    ) -> bool {
        if let Some(ip) = client_ip
            && self.has_reversed_entry(&reversed_key(client_app_id, namespace, ip))
        {
            return true;
        }
        self.has_reversed_entry(&reversed_key(client_app_id, namespace, ALL_IP))
    }

    fn has_reversed_entry(&self, key: &str) -> bool {
        self.reversed_gray_release_rule_cache
            .get(key)
            .is_some_and(|ids| !ids.is_empty())
    }

    /// Ids of the rules currently cached for a namespace
    pub fn cached_rule_ids(&self, app_id: &str, cluster: &str, namespace: &str) -> Vec<i64> {
        self.gray_release_rule_cache
            .get(&rule_key(app_id, cluster, namespace))
            .map(|rules| rules.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Start a new generation and walk every rule row
    pub async fn periodic_scan_rules(&self) -> anyhow::Result<()> {
        let version = self.load_version.fetch_add(1, Ordering::SeqCst) + 1;
        let mut last_id = 0;
        let mut scanned = 0;
        loop {
            let rules = self
                .persistence
                .gray_rule_find_after(last_id, self.batch_size)
                .await?;
            let Some(last) = rules.last() else {
                break;
            };
            last_id = last.id;
            scanned += rules.len();
            self.merge_gray_release_rules(&rules);
            if (rules.len() as u64) < self.batch_size {
                break;
            }
        }
        debug!(version, scanned, "Gray release rules scanned");
        Ok(())
    }

    pub(crate) fn merge_gray_release_rules(&self, rules: &[GrayReleaseRuleInfo]) {
        let current_version = self.load_version();
        for rule in rules {
            // zero release id means the branch was never published
            if rule.release_id == 0 {
                continue;
            }
            self.merge_rule(rule, current_version);
        }
    }

    /// The reverse index is updated while the forward entry is held, so a
    /// concurrent merge of the same namespace cannot interleave between the
    /// two. Lock order is always forward then reverse.
    fn merge_rule(&self, rule: &GrayReleaseRuleInfo, current_version: i64) {
        let key = rule_key(&rule.app_id, &rule.cluster_name, &rule.namespace_name);
        {
            let mut entry = self
                .gray_release_rule_cache
                .entry(key.clone())
                .or_default();
            let cached_rules = entry.value_mut();
            let old = cached_rules
                .values()
                .find(|cached| cached.branch_name == rule.branch_name)
                .cloned();

            match old {
                None if !is_active(rule) => {}
                Some(old) if rule.id <= old.rule_id => {
                    if old.is_active() {
                        old.set_load_version(current_version);
                    } else if current_version - old.load_version() > 1 {
                        cached_rules.remove(&old.rule_id);
                        self.remove_reversed(&old);
                    }
                }
                old => {
                    let new = Arc::new(to_cache(rule, current_version));
                    cached_rules.insert(new.rule_id, new.clone());
                    if new.is_active() {
                        self.add_reversed(&new);
                    }
                    if let Some(old) = old {
                        cached_rules.remove(&old.rule_id);
                        self.remove_reversed(&old);
                    }
                }
            }
        }
        self.gray_release_rule_cache
            .remove_if(&key, |_, rules| rules.is_empty());
    }

    fn add_reversed(&self, rule: &GrayReleaseRuleCache) {
        for item in &rule.rule_items {
            for ip in &item.client_ip_list {
                let key = reversed_key(&item.client_app_id, &rule.namespace_name, ip);
                self.reversed_gray_release_rule_cache
                    .entry(key)
                    .or_default()
                    .insert(rule.rule_id);
            }
        }
    }

    fn remove_reversed(&self, rule: &GrayReleaseRuleCache) {
        for item in &rule.rule_items {
            for ip in &item.client_ip_list {
                let key = reversed_key(&item.client_app_id, &rule.namespace_name, ip);
                if let Some(mut ids) = self.reversed_gray_release_rule_cache.get_mut(&key) {
                    ids.remove(&rule.rule_id);
                }
                self.reversed_gray_release_rule_cache
                    .remove_if(&key, |_, ids| ids.is_empty());
            }
        }
    }

    /// Spawn the periodic full scan
    pub fn start(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Gray release rule scanner started with interval: {:?}",
                self.scan_interval
            );
            let mut interval =
                tokio::time::interval_at(Instant::now() + self.scan_interval, self.scan_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.periodic_scan_rules().await {
                            warn!("Scan gray release rules failed: {}", e);
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
            info!("Gray release rule scanner stopped");
        })
    }
}

#[async_trait]
impl ReleaseMessageListener for GrayReleaseRulesHolder {
    fn name(&self) -> &'static str {
        "gray-release-rules-holder"
    }

    async fn handle_message(
        &self,
        message: &ReleaseMessageInfo,
        channel: &str,
    ) -> anyhow::Result<()> {
        if channel != RELEASE_MESSAGE_TOPIC {
            return Ok(());
        }
        let Some(watch_key) = WatchKey::parse(&message.message) else {
            error!(message = %message.message, "Invalid release message key");
            return Ok(());
        };

        let rules = self
            .persistence
            .gray_rule_find_by_namespace(
                &watch_key.app_id,
                &watch_key.cluster,
                &watch_key.namespace,
            )
            .await?;
        if !rules.is_empty() {
            self.merge_gray_release_rules(&rules);
        }
        Ok(())
    }
}

fn is_active(rule: &GrayReleaseRuleInfo) -> bool {
    rule.branch_status == super::BranchStatus::Active.as_i16()
}

fn to_cache(rule: &GrayReleaseRuleInfo, load_version: i64) -> GrayReleaseRuleCache {
    let rule_items = parse_rule_items(&rule.rules).unwrap_or_else(|e| {
        error!(rule_id = rule.id, "Parse gray release rules failed: {}", e);
        Vec::new()
    });
    GrayReleaseRuleCache::new(
        rule.id,
        rule.branch_name.clone(),
        rule.namespace_name.clone(),
        rule.release_id,
        rule.branch_status,
        rule_items,
        load_version,
    )
}

fn rule_key(app_id: &str, cluster: &str, namespace: &str) -> String {
    assemble_watch_key(app_id, cluster, namespace).to_lowercase()
}

fn reversed_key(client_app_id: &str, namespace: &str, ip: &str) -> String {
    assemble_watch_key(client_app_id, namespace, ip).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_persistence::{GrayReleaseRulePersistence, MemoryPersistService, NewGrayReleaseRule};
    use proptest::prelude::*;

    const RULES: &str = r#"[{"clientAppId":"app2","clientIpList":["10.0.0.5"]}]"#;

    fn rule(id: i64, branch: &str, release_id: i64, status: i16) -> GrayReleaseRuleInfo {
        GrayReleaseRuleInfo {
            id,
            app_id: "app1".to_string(),
            cluster_name: "default".to_string(),
            namespace_name: "application".to_string(),
            branch_name: branch.to_string(),
            rules: RULES.to_string(),
            release_id,
            branch_status: status,
        }
    }

    fn holder(store: Arc<MemoryPersistService>) -> GrayReleaseRulesHolder {
        GrayReleaseRulesHolder::new(store, Duration::from_secs(60), 500)
    }

    fn lookup(holder: &GrayReleaseRulesHolder, ip: &str) -> Option<i64> {
        holder.find_release_id_from_gray_release_rule(
            "app2",
            Some(ip),
            "app1",
            "default",
            "application",
        )
    }

    #[test]
    fn test_active_rule_resolves_matching_client() {
        let holder = holder(Arc::new(MemoryPersistService::new()));
        holder.merge_gray_release_rules(&[rule(1, "b1", 11, 1)]);

        assert_eq!(lookup(&holder, "10.0.0.5"), Some(11));
        assert_eq!(lookup(&holder, "10.0.0.6"), None);
        assert_eq!(
            holder.find_release_id_from_gray_release_rule(
                "APP2",
                Some("10.0.0.5"),
                "APP1",
                "Default",
                "Application"
            ),
            Some(11)
        );
        assert!(holder.has_gray_release_rule("app2", Some("10.0.0.5"), "application"));
        assert!(!holder.has_gray_release_rule("app2", Some("10.0.0.6"), "application"));
        assert!(!holder.has_gray_release_rule("app2", None, "application"));
    }

    #[test]
    fn test_wildcard_rule_reverse_lookup() {
        let holder = holder(Arc::new(MemoryPersistService::new()));
        let mut wildcard = rule(1, "b1", 11, 1);
        wildcard.rules = r#"[{"clientAppId":"app2","clientIpList":["*"]}]"#.to_string();
        holder.merge_gray_release_rules(&[wildcard]);

        assert!(holder.has_gray_release_rule("app2", Some("1.1.1.1"), "application"));
        assert!(holder.has_gray_release_rule("app2", None, "application"));
        assert_eq!(lookup(&holder, "1.1.1.1"), Some(11));
    }

    #[test]
    fn test_unpublished_and_inactive_rules_ignored() {
        let holder = holder(Arc::new(MemoryPersistService::new()));
        holder.merge_gray_release_rules(&[rule(1, "b1", 0, 1), rule(2, "b2", 12, 0)]);
        assert!(holder.cached_rule_ids("app1", "default", "application").is_empty());
        assert_eq!(lookup(&holder, "10.0.0.5"), None);
    }

    #[test]
    fn test_newer_rule_supersedes_and_older_is_ignored() {
        let holder = holder(Arc::new(MemoryPersistService::new()));
        holder.merge_gray_release_rules(&[rule(2, "b1", 12, 1)]);
        holder.merge_gray_release_rules(&[rule(1, "b1", 11, 1)]);
        assert_eq!(lookup(&holder, "10.0.0.5"), Some(12));

        holder.merge_gray_release_rules(&[rule(3, "b1", 12, 2)]);
        assert_eq!(lookup(&holder, "10.0.0.5"), None);
        assert!(!holder.has_gray_release_rule("app2", Some("10.0.0.5"), "application"));
        assert_eq!(holder.cached_rule_ids("app1", "default", "application"), vec![3]);
    }

    #[test]
    fn test_concurrent_merges_keep_indexes_in_step() {
        for _ in 0..20 {
            let holder = holder(Arc::new(MemoryPersistService::new()));
            std::thread::scope(|scope| {
                for worker in 0..4 {
                    let holder = &holder;
                    scope.spawn(move || {
                        for id in 1..=50 {
                            let id = if worker % 2 == 0 { id } else { 51 - id };
                            holder.merge_gray_release_rules(&[rule(id, "b1", 100 + id, 1)]);
                        }
                    });
                }
            });

            assert_eq!(holder.cached_rule_ids("app1", "default", "application"), vec![50]);
            let reversed: Vec<BTreeSet<i64>> = holder
                .reversed_gray_release_rule_cache
                .iter()
                .map(|entry| entry.value().clone())
                .collect();
            assert_eq!(reversed, vec![BTreeSet::from([50])]);
            assert_eq!(lookup(&holder, "10.0.0.5"), Some(150));
        }
    }

    #[tokio::test]
    async fn test_inactive_rule_evicted_after_two_scans() {
        let store = Arc::new(MemoryPersistService::new());
        let holder = holder(store.clone());
        let new_rule = |status: i16| NewGrayReleaseRule {
            app_id: "app1".to_string(),
            cluster_name: "default".to_string(),
            namespace_name: "application".to_string(),
            branch_name: "b1".to_string(),
            rules: RULES.to_string(),
            release_id: 11,
            branch_status: status,
            operator: "alice".to_string(),
        };

        store
            .gray_rule_replace(new_rule(1), "app1+default+application")
            .await
            .unwrap();
        holder.initialize().await.unwrap();
        assert_eq!(lookup(&holder, "10.0.0.5"), Some(11));

        let (deleted, message) = store
            .gray_rule_replace(new_rule(0), "app1+default+application")
            .await
            .unwrap();
        holder
            .handle_message(&message, RELEASE_MESSAGE_TOPIC)
            .await
            .unwrap();
        assert_eq!(lookup(&holder, "10.0.0.5"), None);
        assert_eq!(
            holder.cached_rule_ids("app1", "default", "application"),
            vec![deleted.id]
        );

        holder.periodic_scan_rules().await.unwrap();
        assert_eq!(
            holder.cached_rule_ids("app1", "default", "application"),
            vec![deleted.id]
        );
        holder.periodic_scan_rules().await.unwrap();
        assert!(holder.cached_rule_ids("app1", "default", "application").is_empty());
    }

    #[tokio::test]
    async fn test_listener_ignores_malformed_key() {
        let holder = holder(Arc::new(MemoryPersistService::new()));
        let message = ReleaseMessageInfo {
            id: 1,
            message: "app1+default".to_string(),
            last_modified_time: 0,
        };
        assert!(
            holder
                .handle_message(&message, RELEASE_MESSAGE_TOPIC)
                .await
                .is_ok()
        );
    }

    proptest! {
        #[test]
        fn prop_highest_active_rule_wins_in_any_order(
            statuses in prop::collection::vec(0i16..3, 1..8),
            seed in any::<u64>(),
        ) {
            let mut rules: Vec<GrayReleaseRuleInfo> = statuses
                .iter()
                .enumerate()
                .map(|(i, status)| rule(i as i64 + 1, "b1", 100 + i as i64, *status))
                .collect();
            let highest = rules.len() as i64;
            if let Some(last) = rules.last_mut() {
                last.branch_status = 1;
            }

            // deterministic shuffle
            let mut order: Vec<usize> = (0..rules.len()).collect();
            let mut state = seed;
            for i in (1..order.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                order.swap(i, (state >> 33) as usize % (i + 1));
            }

            let holder = holder(Arc::new(MemoryPersistService::new()));
            for i in order {
                holder.merge_gray_release_rules(std::slice::from_ref(&rules[i]));
            }

            prop_assert_eq!(lookup(&holder, "10.0.0.5"), Some(99 + highest));
            prop_assert_eq!(
                holder.cached_rule_ids("app1", "default", "application"),
                vec![highest]
            );
        }
    }
}
