//! Publish and rollback

use actix_web::{HttpResponse, web};
use serde::Deserialize;

use super::item::AdminNamespacePath;
use crate::model::AppState;
use crate::model::response::error_response;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    /// Defaults to the generated release key
    #[serde(default)]
    pub release_title: String,
    #[serde(default)]
    pub release_comment: String,
    pub released_by: String,
    #[serde(default)]
    pub is_emergency_publish: bool,
}

pub async fn publish(
    state: web::Data<AppState>,
    path: web::Path<AdminNamespacePath>,
    body: web::Json<PublishRequest>,
) -> HttpResponse {
    match state
        .engine
        .release_service()
        .publish(
            &path.app_id,
            &path.cluster_name,
            &path.namespace,
            &body.release_title,
            &body.release_comment,
            &body.released_by,
            body.is_emergency_publish,
        )
        .await
    {
        Ok(release) => HttpResponse::Ok().json(release),
        Err(e) => error_response(e),
    }
}

pub async fn find_latest_release(
    state: web::Data<AppState>,
    path: web::Path<AdminNamespacePath>,
) -> HttpResponse {
    match state
        .engine
        .release_service()
        .find_latest_active(&path.app_id, &path.cluster_name, &path.namespace)
        .await
    {
        Ok(Some(release)) => HttpResponse::Ok().json(release),
        Ok(None) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackQuery {
    pub operator: String,
    /// Roll back to this earlier release instead of the previous one
    pub to_release_id: Option<i64>,
}

/// PUT `/releases/{releaseId}/rollback?operator=&toReleaseId=`
pub async fn rollback(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<RollbackQuery>,
) -> HttpResponse {
    let release_service = state.engine.release_service();
    let release_id = path.into_inner();
    let result = match query.to_release_id {
        Some(to_release_id) if to_release_id >= 0 => {
            release_service
                .rollback_to(release_id, to_release_id, &query.operator)
                .await
        }
        _ => release_service.rollback(release_id, &query.operator).await,
    };
    match result {
        Ok(release) => HttpResponse::Ok().json(release),
        Err(e) => error_response(e),
    }
}
