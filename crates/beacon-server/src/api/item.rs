//! Item edits. Every edit takes the namespace lock for its operator.

use actix_web::{HttpResponse, web};
use serde::Deserialize;

use beacon_persistence::NewItem;

use super::OperatorQuery;
use crate::model::AppState;
use crate::model::response::error_response;

/// `apps/{appId}/clusters/{clusterName}/namespaces/{namespace}`
#[derive(Debug, Deserialize)]
pub struct AdminNamespacePath {
    pub app_id: String,
    pub cluster_name: String,
    pub namespace: String,
}

#[derive(Debug, Deserialize)]
pub struct ItemPath {
    pub app_id: String,
    pub cluster_name: String,
    pub namespace: String,
    pub item_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub line_num: i32,
    pub operator: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub value: String,
    #[serde(default)]
    pub comment: String,
    pub operator: String,
}

pub async fn find_items(
    state: web::Data<AppState>,
    path: web::Path<AdminNamespacePath>,
) -> HttpResponse {
    match state
        .engine
        .item_service()
        .find_items(&path.app_id, &path.cluster_name, &path.namespace)
        .await
    {
        Ok(items) => HttpResponse::Ok().json(items),
        Err(e) => error_response(e),
    }
}

pub async fn create_item(
    state: web::Data<AppState>,
    path: web::Path<AdminNamespacePath>,
    body: web::Json<CreateItemRequest>,
) -> HttpResponse {
    let body = body.into_inner();
    let item = NewItem {
        key: body.key,
        value: body.value,
        comment: body.comment,
        line_num: body.line_num,
    };
    match state
        .engine
        .item_service()
        .create_item(
            &path.app_id,
            &path.cluster_name,
            &path.namespace,
            item,
            &body.operator,
        )
        .await
    {
        Ok(item) => HttpResponse::Ok().json(item),
        Err(e) => error_response(e),
    }
}

pub async fn update_item(
    state: web::Data<AppState>,
    path: web::Path<ItemPath>,
    body: web::Json<UpdateItemRequest>,
) -> HttpResponse {
    match state
        .engine
        .item_service()
        .update_item(path.item_id, &body.value, &body.comment, &body.operator)
        .await
    {
        Ok(item) => HttpResponse::Ok().json(item),
        Err(e) => error_response(e),
    }
}

/// DELETE `/items/{itemId}?operator=`
pub async fn delete_item(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<OperatorQuery>,
) -> HttpResponse {
    match state
        .engine
        .item_service()
        .delete_item(path.into_inner(), &query.operator)
        .await
    {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(e) => error_response(e),
    }
}
