//! Gray branches and their rules

use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};

use beacon_persistence::GrayReleaseRuleInfo;
use beacon_release::gray::{BranchStatus, GrayReleaseRuleItem};

use super::item::AdminNamespacePath;
use crate::model::AppState;
use crate::model::response::{ErrorResult, error_response};

#[derive(Debug, Deserialize)]
pub struct BranchPath {
    pub app_id: String,
    pub cluster_name: String,
    pub namespace: String,
    pub branch_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBranchRequest {
    pub branch_name: String,
    pub operator: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRulesRequest {
    #[serde(default)]
    pub rule_items: Vec<GrayReleaseRuleItem>,
    pub operator: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBranchQuery {
    pub operator: String,
    /// `0` deleted (default) or `2` merged
    #[serde(default)]
    pub branch_status: Option<i16>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchRulesResponse {
    #[serde(flatten)]
    pub rule: GrayReleaseRuleInfo,
    pub rule_items: Vec<GrayReleaseRuleItem>,
}

pub async fn find_branch(
    state: web::Data<AppState>,
    path: web::Path<AdminNamespacePath>,
) -> HttpResponse {
    match state
        .engine
        .branch_service()
        .find_branch(&path.app_id, &path.cluster_name, &path.namespace)
        .await
    {
        Ok(Some(branch)) => HttpResponse::Ok().json(branch),
        Ok(None) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(e),
    }
}

pub async fn create_branch(
    state: web::Data<AppState>,
    path: web::Path<AdminNamespacePath>,
    body: web::Json<CreateBranchRequest>,
) -> HttpResponse {
    match state
        .engine
        .branch_service()
        .create_branch(
            &path.app_id,
            &path.cluster_name,
            &path.namespace,
            &body.branch_name,
            &body.operator,
        )
        .await
    {
        Ok(branch) => HttpResponse::Ok().json(branch),
        Err(e) => error_response(e),
    }
}

pub async fn find_branch_rules(
    state: web::Data<AppState>,
    path: web::Path<BranchPath>,
) -> HttpResponse {
    match state
        .engine
        .branch_service()
        .find_branch_rules(
            &path.app_id,
            &path.cluster_name,
            &path.namespace,
            &path.branch_name,
        )
        .await
    {
        Ok(Some((rule, rule_items))) => {
            HttpResponse::Ok().json(BranchRulesResponse { rule, rule_items })
        }
        Ok(None) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(e),
    }
}

pub async fn update_branch_rules(
    state: web::Data<AppState>,
    path: web::Path<BranchPath>,
    body: web::Json<UpdateRulesRequest>,
) -> HttpResponse {
    match state
        .engine
        .branch_service()
        .update_branch_rules(
            &path.app_id,
            &path.cluster_name,
            &path.namespace,
            &path.branch_name,
            &body.rule_items,
            &body.operator,
        )
        .await
    {
        Ok(rule) => HttpResponse::Ok().json(rule),
        Err(e) => error_response(e),
    }
}

pub async fn delete_branch(
    state: web::Data<AppState>,
    path: web::Path<BranchPath>,
    query: web::Query<DeleteBranchQuery>,
) -> HttpResponse {
    let status = match query.branch_status {
        None => BranchStatus::Deleted,
        Some(value) => match BranchStatus::from_i16(value) {
            Some(status) => status,
            None => return ErrorResult::bad_request(format!("unknown branch status: {}", value)),
        },
    };
    match state
        .engine
        .branch_service()
        .delete_branch(
            &path.app_id,
            &path.cluster_name,
            &path.namespace,
            &path.branch_name,
            status,
            &query.operator,
        )
        .await
    {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(e) => error_response(e),
    }
}
