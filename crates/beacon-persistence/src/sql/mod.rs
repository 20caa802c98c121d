//! SQL-based persistence backend (MySQL/PostgreSQL via SeaORM)
//!
//! Every write that must be paired with a change log row runs inside a single
//! database transaction.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sea_orm::{prelude::Expr, *};
use tracing::debug;

use crate::entity::{
    cluster, gray_release_rule, item, namespace, namespace_lock, release, release_message,
};
use crate::model::*;
use crate::traits::*;

/// External database persistence service
///
/// Wraps a SeaORM `DatabaseConnection` and implements all persistence traits
/// with direct queries.
pub struct ExternalDbPersistService {
    db: DatabaseConnection,
}

impl ExternalDbPersistService {
    /// Create a new ExternalDbPersistService with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Get a reference to the underlying database connection
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

fn to_millis(time: Option<NaiveDateTime>) -> i64 {
    time.map(|t| t.and_utc().timestamp_millis())
        .unwrap_or_default()
}

fn release_to_info(model: release::Model) -> ReleaseInfo {
    ReleaseInfo {
        id: model.id,
        release_key: model.release_key,
        name: model.name,
        app_id: model.app_id,
        cluster_name: model.cluster_name,
        namespace_name: model.namespace_name,
        configurations: model.configurations.unwrap_or_default(),
        comment: model.comment.unwrap_or_default(),
        is_abandoned: model.is_abandoned,
        created_by: model.created_by.unwrap_or_default(),
        created_time: to_millis(model.created_time),
    }
}

fn message_to_info(model: release_message::Model) -> ReleaseMessageInfo {
    ReleaseMessageInfo {
        id: model.id,
        message: model.message,
        last_modified_time: to_millis(model.last_modified_time),
    }
}

fn rule_to_info(model: gray_release_rule::Model) -> GrayReleaseRuleInfo {
    GrayReleaseRuleInfo {
        id: model.id,
        app_id: model.app_id,
        cluster_name: model.cluster_name,
        namespace_name: model.namespace_name,
        branch_name: model.branch_name,
        rules: model.rules.unwrap_or_default(),
        release_id: model.release_id,
        branch_status: model.branch_status,
    }
}

fn cluster_to_info(model: cluster::Model) -> ClusterInfo {
    ClusterInfo {
        id: model.id,
        app_id: model.app_id,
        name: model.name,
        parent_cluster_id: model.parent_cluster_id,
    }
}

fn namespace_to_info(model: namespace::Model) -> NamespaceInfo {
    NamespaceInfo {
        id: model.id,
        app_id: model.app_id,
        cluster_name: model.cluster_name,
        namespace_name: model.namespace_name,
    }
}

fn item_to_info(model: item::Model) -> ItemInfo {
    ItemInfo {
        id: model.id,
        namespace_id: model.namespace_id,
        key: model.key,
        value: model.value.unwrap_or_default(),
        comment: model.comment.unwrap_or_default(),
        line_num: model.line_num.unwrap_or_default(),
        last_modified_by: model.last_modified_by.unwrap_or_default(),
    }
}

fn lock_to_info(model: namespace_lock::Model) -> NamespaceLockInfo {
    NamespaceLockInfo {
        id: model.id,
        namespace_id: model.namespace_id,
        locked_by: model.created_by,
        created_time: to_millis(model.created_time),
    }
}

async fn insert_message<C: ConnectionTrait>(
    conn: &C,
    message: &str,
) -> anyhow::Result<ReleaseMessageInfo> {
    let model = release_message::ActiveModel {
        message: Set(message.to_string()),
        last_modified_time: Set(Some(now())),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(message_to_info(model))
}

async fn insert_release<C: ConnectionTrait>(
    conn: &C,
    new: NewRelease,
) -> anyhow::Result<release::Model> {
    let now = now();
    let model = release::ActiveModel {
        release_key: Set(new.release_key),
        name: Set(new.name),
        app_id: Set(new.app_id),
        cluster_name: Set(new.cluster_name),
        namespace_name: Set(new.namespace_name),
        configurations: Set(Some(new.configurations)),
        comment: Set(Some(new.comment)),
        is_abandoned: Set(false),
        is_deleted: Set(false),
        deleted_at: Set(None),
        created_by: Set(Some(new.operator.clone())),
        created_time: Set(Some(now)),
        last_modified_by: Set(Some(new.operator)),
        last_modified_time: Set(Some(now)),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(model)
}

/// Soft-delete the live rules of a branch, then insert the replacement
async fn replace_rule<C: ConnectionTrait>(
    conn: &C,
    new: NewGrayReleaseRule,
) -> anyhow::Result<gray_release_rule::Model> {
    let now = now();
    gray_release_rule::Entity::update_many()
        .col_expr(gray_release_rule::Column::IsDeleted, Expr::value(true))
        .col_expr(gray_release_rule::Column::DeletedAt, Expr::value(now))
        .col_expr(
            gray_release_rule::Column::LastModifiedBy,
            Expr::value(new.operator.clone()),
        )
        .filter(gray_release_rule::Column::AppId.eq(new.app_id.as_str()))
        .filter(gray_release_rule::Column::ClusterName.eq(new.cluster_name.as_str()))
        .filter(gray_release_rule::Column::NamespaceName.eq(new.namespace_name.as_str()))
        .filter(gray_release_rule::Column::BranchName.eq(new.branch_name.as_str()))
        .filter(gray_release_rule::Column::IsDeleted.eq(false))
        .exec(conn)
        .await?;

    let model = gray_release_rule::ActiveModel {
        app_id: Set(new.app_id),
        cluster_name: Set(new.cluster_name),
        namespace_name: Set(new.namespace_name),
        branch_name: Set(new.branch_name),
        rules: Set(Some(new.rules)),
        release_id: Set(new.release_id),
        branch_status: Set(new.branch_status),
        is_deleted: Set(false),
        deleted_at: Set(None),
        created_by: Set(Some(new.operator.clone())),
        created_time: Set(Some(now)),
        last_modified_by: Set(Some(new.operator)),
        last_modified_time: Set(Some(now)),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(model)
}

async fn find_latest_branch_rule<C: ConnectionTrait>(
    conn: &C,
    app_id: &str,
    cluster_name: &str,
    namespace_name: &str,
    branch_name: &str,
) -> anyhow::Result<Option<gray_release_rule::Model>> {
    let result = gray_release_rule::Entity::find()
        .filter(gray_release_rule::Column::AppId.eq(app_id))
        .filter(gray_release_rule::Column::ClusterName.eq(cluster_name))
        .filter(gray_release_rule::Column::NamespaceName.eq(namespace_name))
        .filter(gray_release_rule::Column::BranchName.eq(branch_name))
        .filter(gray_release_rule::Column::IsDeleted.eq(false))
        .order_by_desc(gray_release_rule::Column::Id)
        .one(conn)
        .await?;
    Ok(result)
}

// ============================================================================
// PersistenceService implementation
// ============================================================================

#[async_trait]
impl PersistenceService for ExternalDbPersistService {
    fn storage_mode(&self) -> StorageMode {
        StorageMode::ExternalDb
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        self.db.ping().await?;
        Ok(())
    }
}

// ============================================================================
// ReleasePersistence implementation
// ============================================================================

#[async_trait]
impl ReleasePersistence for ExternalDbPersistService {
    async fn release_find_by_id(&self, id: i64) -> anyhow::Result<Option<ReleaseInfo>> {
        let result = release::Entity::find_by_id(id)
            .filter(release::Column::IsDeleted.eq(false))
            .one(&self.db)
            .await?;
        Ok(result.map(release_to_info))
    }

    async fn release_find_active_by_id(&self, id: i64) -> anyhow::Result<Option<ReleaseInfo>> {
        let result = release::Entity::find_by_id(id)
            .filter(release::Column::IsAbandoned.eq(false))
            .filter(release::Column::IsDeleted.eq(false))
            .one(&self.db)
            .await?;
        Ok(result.map(release_to_info))
    }

    async fn release_find_latest_active(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
    ) -> anyhow::Result<Option<ReleaseInfo>> {
        let result = release::Entity::find()
            .filter(release::Column::AppId.eq(app_id))
            .filter(release::Column::ClusterName.eq(cluster_name))
            .filter(release::Column::NamespaceName.eq(namespace_name))
            .filter(release::Column::IsAbandoned.eq(false))
            .filter(release::Column::IsDeleted.eq(false))
            .order_by_desc(release::Column::Id)
            .one(&self.db)
            .await?;
        Ok(result.map(release_to_info))
    }

    async fn release_find_active(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
        limit: u64,
    ) -> anyhow::Result<Vec<ReleaseInfo>> {
        let result = release::Entity::find()
            .filter(release::Column::AppId.eq(app_id))
            .filter(release::Column::ClusterName.eq(cluster_name))
            .filter(release::Column::NamespaceName.eq(namespace_name))
            .filter(release::Column::IsAbandoned.eq(false))
            .filter(release::Column::IsDeleted.eq(false))
            .order_by_desc(release::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(result.into_iter().map(release_to_info).collect())
    }

    async fn release_find_active_between(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
        min_id: i64,
        max_id: i64,
    ) -> anyhow::Result<Vec<ReleaseInfo>> {
        let result = release::Entity::find()
            .filter(release::Column::AppId.eq(app_id))
            .filter(release::Column::ClusterName.eq(cluster_name))
            .filter(release::Column::NamespaceName.eq(namespace_name))
            .filter(release::Column::Id.between(min_id, max_id))
            .filter(release::Column::IsAbandoned.eq(false))
            .filter(release::Column::IsDeleted.eq(false))
            .order_by_desc(release::Column::Id)
            .all(&self.db)
            .await?;
        Ok(result.into_iter().map(release_to_info).collect())
    }

    async fn release_publish(
        &self,
        release: NewRelease,
        message: &str,
    ) -> anyhow::Result<(ReleaseInfo, ReleaseMessageInfo)> {
        let tx = self.db.begin().await?;
        let release = insert_release(&tx, release).await?;
        let message = insert_message(&tx, message).await?;
        tx.commit().await?;

        debug!(release_id = release.id, message_id = message.id, "release committed");
        Ok((release_to_info(release), message))
    }

    async fn release_publish_branch(
        &self,
        release: NewRelease,
        parent_cluster_name: &str,
        message: &str,
    ) -> anyhow::Result<(ReleaseInfo, Option<GrayReleaseRuleInfo>, ReleaseMessageInfo)> {
        let tx = self.db.begin().await?;
        let current_rule = find_latest_branch_rule(
            &tx,
            &release.app_id,
            parent_cluster_name,
            &release.namespace_name,
            &release.cluster_name,
        )
        .await?;
        let operator = release.operator.clone();
        let release = insert_release(&tx, release).await?;

        let rule = match current_rule {
            Some(old) => Some(
                replace_rule(
                    &tx,
                    NewGrayReleaseRule {
                        app_id: old.app_id,
                        cluster_name: old.cluster_name,
                        namespace_name: old.namespace_name,
                        branch_name: old.branch_name,
                        rules: old.rules.unwrap_or_default(),
                        release_id: release.id,
                        branch_status: old.branch_status,
                        operator,
                    },
                )
                .await?,
            ),
            None => None,
        };
        let message = insert_message(&tx, message).await?;
        tx.commit().await?;

        Ok((
            release_to_info(release),
            rule.map(rule_to_info),
            message,
        ))
    }

    async fn release_abandon(
        &self,
        ids: &[i64],
        operator: &str,
        message: &str,
    ) -> anyhow::Result<ReleaseMessageInfo> {
        let tx = self.db.begin().await?;
        let result = release::Entity::update_many()
            .col_expr(release::Column::IsAbandoned, Expr::value(true))
            .col_expr(release::Column::LastModifiedBy, Expr::value(operator))
            .col_expr(release::Column::LastModifiedTime, Expr::value(now()))
            .filter(release::Column::Id.is_in(ids.to_vec()))
            .filter(release::Column::IsDeleted.eq(false))
            .exec(&tx)
            .await?;
        if result.rows_affected != ids.len() as u64 {
            tx.rollback().await?;
            anyhow::bail!("releases {:?} not found", ids);
        }
        let message = insert_message(&tx, message).await?;
        tx.commit().await?;
        Ok(message)
    }
}

// ============================================================================
// ReleaseMessagePersistence implementation
// ============================================================================

#[async_trait]
impl ReleaseMessagePersistence for ExternalDbPersistService {
    async fn message_create(&self, message: &str) -> anyhow::Result<ReleaseMessageInfo> {
        insert_message(&self.db, message).await
    }

    async fn message_find_by_id(&self, id: i64) -> anyhow::Result<Option<ReleaseMessageInfo>> {
        let result = release_message::Entity::find_by_id(id).one(&self.db).await?;
        Ok(result.map(message_to_info))
    }

    async fn message_find_max_id(&self) -> anyhow::Result<i64> {
        let result = release_message::Entity::find()
            .order_by_desc(release_message::Column::Id)
            .one(&self.db)
            .await?;
        Ok(result.map(|m| m.id).unwrap_or(0))
    }

    async fn message_find_after(
        &self,
        after_id: i64,
        limit: u64,
    ) -> anyhow::Result<Vec<ReleaseMessageInfo>> {
        let result = release_message::Entity::find()
            .filter(release_message::Column::Id.gt(after_id))
            .order_by_asc(release_message::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(result.into_iter().map(message_to_info).collect())
    }

    async fn message_find_latest_by_messages(
        &self,
        messages: &[String],
    ) -> anyhow::Result<Option<ReleaseMessageInfo>> {
        if messages.is_empty() {
            return Ok(None);
        }
        let result = release_message::Entity::find()
            .filter(release_message::Column::Message.is_in(messages.iter().cloned()))
            .order_by_desc(release_message::Column::Id)
            .one(&self.db)
            .await?;
        Ok(result.map(message_to_info))
    }

    async fn message_find_earlier(
        &self,
        message: &str,
        before_id: i64,
        limit: u64,
    ) -> anyhow::Result<Vec<ReleaseMessageInfo>> {
        let result = release_message::Entity::find()
            .filter(release_message::Column::Message.eq(message))
            .filter(release_message::Column::Id.lt(before_id))
            .order_by_asc(release_message::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(result.into_iter().map(message_to_info).collect())
    }

    async fn message_delete_by_ids(&self, ids: &[i64]) -> anyhow::Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = release_message::Entity::delete_many()
            .filter(release_message::Column::Id.is_in(ids.iter().copied()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

// ============================================================================
// GrayReleaseRulePersistence implementation
// ============================================================================

#[async_trait]
impl GrayReleaseRulePersistence for ExternalDbPersistService {
    async fn gray_rule_find_by_namespace(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
    ) -> anyhow::Result<Vec<GrayReleaseRuleInfo>> {
        let result = gray_release_rule::Entity::find()
            .filter(gray_release_rule::Column::AppId.eq(app_id))
            .filter(gray_release_rule::Column::ClusterName.eq(cluster_name))
            .filter(gray_release_rule::Column::NamespaceName.eq(namespace_name))
            .filter(gray_release_rule::Column::IsDeleted.eq(false))
            .order_by_asc(gray_release_rule::Column::Id)
            .all(&self.db)
            .await?;
        Ok(result.into_iter().map(rule_to_info).collect())
    }

    async fn gray_rule_find_latest_by_branch(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
        branch_name: &str,
    ) -> anyhow::Result<Option<GrayReleaseRuleInfo>> {
        let result =
            find_latest_branch_rule(&self.db, app_id, cluster_name, namespace_name, branch_name)
                .await?;
        Ok(result.map(rule_to_info))
    }

    async fn gray_rule_find_after(
        &self,
        after_id: i64,
        limit: u64,
    ) -> anyhow::Result<Vec<GrayReleaseRuleInfo>> {
        let result = gray_release_rule::Entity::find()
            .filter(gray_release_rule::Column::Id.gt(after_id))
            .filter(gray_release_rule::Column::IsDeleted.eq(false))
            .order_by_asc(gray_release_rule::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(result.into_iter().map(rule_to_info).collect())
    }

    async fn gray_rule_replace(
        &self,
        rule: NewGrayReleaseRule,
        message: &str,
    ) -> anyhow::Result<(GrayReleaseRuleInfo, ReleaseMessageInfo)> {
        let tx = self.db.begin().await?;
        let rule = replace_rule(&tx, rule).await?;
        let message = insert_message(&tx, message).await?;
        tx.commit().await?;
        Ok((rule_to_info(rule), message))
    }
}

// ============================================================================
// NamespacePersistence implementation
// ============================================================================

#[async_trait]
impl NamespacePersistence for ExternalDbPersistService {
    async fn cluster_create(
        &self,
        app_id: &str,
        name: &str,
        parent_cluster_id: i64,
        operator: &str,
    ) -> anyhow::Result<ClusterInfo> {
        let now = now();
        let model = cluster::ActiveModel {
            name: Set(name.to_string()),
            app_id: Set(app_id.to_string()),
            parent_cluster_id: Set(parent_cluster_id),
            is_deleted: Set(false),
            deleted_at: Set(None),
            created_by: Set(Some(operator.to_string())),
            created_time: Set(Some(now)),
            last_modified_by: Set(Some(operator.to_string())),
            last_modified_time: Set(Some(now)),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(cluster_to_info(model))
    }

    async fn cluster_delete(&self, id: i64, operator: &str) -> anyhow::Result<bool> {
        let tx = self.db.begin().await?;
        let Some(cluster) = cluster::Entity::find_by_id(id)
            .filter(cluster::Column::IsDeleted.eq(false))
            .one(&tx)
            .await?
        else {
            tx.rollback().await?;
            return Ok(false);
        };

        let now = now();
        let namespace_ids: Vec<i64> = namespace::Entity::find()
            .filter(namespace::Column::AppId.eq(cluster.app_id.as_str()))
            .filter(namespace::Column::ClusterName.eq(cluster.name.as_str()))
            .filter(namespace::Column::IsDeleted.eq(false))
            .all(&tx)
            .await?
            .into_iter()
            .map(|n| n.id)
            .collect();

        if !namespace_ids.is_empty() {
            namespace_lock::Entity::delete_many()
                .filter(namespace_lock::Column::NamespaceId.is_in(namespace_ids.clone()))
                .exec(&tx)
                .await?;
            namespace::Entity::update_many()
                .col_expr(namespace::Column::IsDeleted, Expr::value(true))
                .col_expr(namespace::Column::DeletedAt, Expr::value(now))
                .col_expr(namespace::Column::LastModifiedBy, Expr::value(operator))
                .filter(namespace::Column::Id.is_in(namespace_ids))
                .exec(&tx)
                .await?;
        }

        cluster::Entity::update_many()
            .col_expr(cluster::Column::IsDeleted, Expr::value(true))
            .col_expr(cluster::Column::DeletedAt, Expr::value(now))
            .col_expr(cluster::Column::LastModifiedBy, Expr::value(operator))
            .filter(cluster::Column::Id.eq(id))
            .exec(&tx)
            .await?;

        tx.commit().await?;
        debug!(cluster_id = id, "Cluster deleted");
        Ok(true)
    }

    async fn cluster_find(&self, app_id: &str, name: &str) -> anyhow::Result<Option<ClusterInfo>> {
        let result = cluster::Entity::find()
            .filter(cluster::Column::AppId.eq(app_id))
            .filter(cluster::Column::Name.eq(name))
            .filter(cluster::Column::IsDeleted.eq(false))
            .one(&self.db)
            .await?;
        Ok(result.map(cluster_to_info))
    }

    async fn cluster_find_by_id(&self, id: i64) -> anyhow::Result<Option<ClusterInfo>> {
        let result = cluster::Entity::find_by_id(id)
            .filter(cluster::Column::IsDeleted.eq(false))
            .one(&self.db)
            .await?;
        Ok(result.map(cluster_to_info))
    }

    async fn cluster_find_children(
        &self,
        app_id: &str,
        parent_cluster_id: i64,
    ) -> anyhow::Result<Vec<ClusterInfo>> {
        let result = cluster::Entity::find()
            .filter(cluster::Column::AppId.eq(app_id))
            .filter(cluster::Column::ParentClusterId.eq(parent_cluster_id))
            .filter(cluster::Column::IsDeleted.eq(false))
            .order_by_asc(cluster::Column::Id)
            .all(&self.db)
            .await?;
        Ok(result.into_iter().map(cluster_to_info).collect())
    }

    async fn namespace_create(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
        operator: &str,
    ) -> anyhow::Result<NamespaceInfo> {
        let now = now();
        let model = namespace::ActiveModel {
            app_id: Set(app_id.to_string()),
            cluster_name: Set(cluster_name.to_string()),
            namespace_name: Set(namespace_name.to_string()),
            is_deleted: Set(false),
            deleted_at: Set(None),
            created_by: Set(Some(operator.to_string())),
            created_time: Set(Some(now)),
            last_modified_by: Set(Some(operator.to_string())),
            last_modified_time: Set(Some(now)),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(namespace_to_info(model))
    }

    async fn namespace_find(
        &self,
        app_id: &str,
        cluster_name: &str,
        namespace_name: &str,
    ) -> anyhow::Result<Option<NamespaceInfo>> {
        let result = namespace::Entity::find()
            .filter(namespace::Column::AppId.eq(app_id))
            .filter(namespace::Column::ClusterName.eq(cluster_name))
            .filter(namespace::Column::NamespaceName.eq(namespace_name))
            .filter(namespace::Column::IsDeleted.eq(false))
            .one(&self.db)
            .await?;
        Ok(result.map(namespace_to_info))
    }

    async fn namespace_find_by_id(&self, id: i64) -> anyhow::Result<Option<NamespaceInfo>> {
        let result = namespace::Entity::find_by_id(id)
            .filter(namespace::Column::IsDeleted.eq(false))
            .one(&self.db)
            .await?;
        Ok(result.map(namespace_to_info))
    }

    async fn namespace_find_parent(
        &self,
        namespace: &NamespaceInfo,
    ) -> anyhow::Result<Option<NamespaceInfo>> {
        let Some(cluster) = self
            .cluster_find(&namespace.app_id, &namespace.cluster_name)
            .await?
        else {
            return Ok(None);
        };
        if cluster.parent_cluster_id == 0 {
            return Ok(None);
        }
        let Some(parent) = self.cluster_find_by_id(cluster.parent_cluster_id).await? else {
            return Ok(None);
        };
        self.namespace_find(&namespace.app_id, &parent.name, &namespace.namespace_name)
            .await
    }
}

// ============================================================================
// ItemPersistence implementation
// ============================================================================

#[async_trait]
impl ItemPersistence for ExternalDbPersistService {
    async fn item_find_by_namespace(&self, namespace_id: i64) -> anyhow::Result<Vec<ItemInfo>> {
        let result = item::Entity::find()
            .filter(item::Column::NamespaceId.eq(namespace_id))
            .filter(item::Column::IsDeleted.eq(false))
            .order_by_asc(item::Column::LineNum)
            .order_by_asc(item::Column::Id)
            .all(&self.db)
            .await?;
        Ok(result.into_iter().map(item_to_info).collect())
    }

    async fn item_find_by_id(&self, id: i64) -> anyhow::Result<Option<ItemInfo>> {
        let result = item::Entity::find_by_id(id)
            .filter(item::Column::IsDeleted.eq(false))
            .one(&self.db)
            .await?;
        Ok(result.map(item_to_info))
    }

    async fn item_find_by_key(
        &self,
        namespace_id: i64,
        key: &str,
    ) -> anyhow::Result<Option<ItemInfo>> {
        let result = item::Entity::find()
            .filter(item::Column::NamespaceId.eq(namespace_id))
            .filter(item::Column::Key.eq(key))
            .filter(item::Column::IsDeleted.eq(false))
            .order_by_desc(item::Column::Id)
            .one(&self.db)
            .await?;
        Ok(result.map(item_to_info))
    }

    async fn item_create(
        &self,
        namespace_id: i64,
        item: NewItem,
        operator: &str,
    ) -> anyhow::Result<ItemInfo> {
        let now = now();
        let model = item::ActiveModel {
            namespace_id: Set(namespace_id),
            key: Set(item.key),
            value: Set(Some(item.value)),
            comment: Set(Some(item.comment)),
            line_num: Set(Some(item.line_num)),
            is_deleted: Set(false),
            deleted_at: Set(None),
            created_by: Set(Some(operator.to_string())),
            created_time: Set(Some(now)),
            last_modified_by: Set(Some(operator.to_string())),
            last_modified_time: Set(Some(now)),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(item_to_info(model))
    }

    async fn item_update(
        &self,
        id: i64,
        value: &str,
        comment: &str,
        operator: &str,
    ) -> anyhow::Result<Option<ItemInfo>> {
        let Some(existing) = item::Entity::find_by_id(id)
            .filter(item::Column::IsDeleted.eq(false))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let mut active: item::ActiveModel = existing.into();
        active.value = Set(Some(value.to_string()));
        active.comment = Set(Some(comment.to_string()));
        active.last_modified_by = Set(Some(operator.to_string()));
        active.last_modified_time = Set(Some(now()));
        let model = active.update(&self.db).await?;
        Ok(Some(item_to_info(model)))
    }

    async fn item_delete(&self, id: i64, operator: &str) -> anyhow::Result<bool> {
        let now = now();
        let result = item::Entity::update_many()
            .col_expr(item::Column::IsDeleted, Expr::value(true))
            .col_expr(item::Column::DeletedAt, Expr::value(now))
            .col_expr(item::Column::LastModifiedBy, Expr::value(operator))
            .col_expr(item::Column::LastModifiedTime, Expr::value(now))
            .filter(item::Column::Id.eq(id))
            .filter(item::Column::IsDeleted.eq(false))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}

// ============================================================================
// NamespaceLockPersistence implementation
// ============================================================================

#[async_trait]
impl NamespaceLockPersistence for ExternalDbPersistService {
    async fn lock_find(&self, namespace_id: i64) -> anyhow::Result<Option<NamespaceLockInfo>> {
        let result = namespace_lock::Entity::find()
            .filter(namespace_lock::Column::NamespaceId.eq(namespace_id))
            .one(&self.db)
            .await?;
        Ok(result.map(lock_to_info))
    }

    async fn lock_try_insert(
        &self,
        namespace_id: i64,
        owner: &str,
    ) -> anyhow::Result<LockInsertOutcome> {
        let result = namespace_lock::ActiveModel {
            namespace_id: Set(namespace_id),
            created_by: Set(owner.to_string()),
            created_time: Set(Some(now())),
            ..Default::default()
        }
        .insert(&self.db)
        .await;

        match result {
            Ok(model) => Ok(LockInsertOutcome::Acquired(lock_to_info(model))),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                debug!(namespace_id, owner, "namespace lock insert conflicted");
                Ok(LockInsertOutcome::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn lock_delete(&self, namespace_id: i64) -> anyhow::Result<bool> {
        let result = namespace_lock::Entity::delete_many()
            .filter(namespace_lock::Column::NamespaceId.eq(namespace_id))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
