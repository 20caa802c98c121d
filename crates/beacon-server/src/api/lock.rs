//! GET `/apps/{appId}/clusters/{clusterName}/namespaces/{namespace}/lock`

use actix_web::{HttpResponse, web};

use super::item::AdminNamespacePath;
use crate::model::AppState;
use crate::model::response::error_response;

pub async fn get_namespace_lock(
    state: web::Data<AppState>,
    path: web::Path<AdminNamespacePath>,
) -> HttpResponse {
    match state
        .engine
        .lock_service()
        .lock_status(&path.app_id, &path.cluster_name, &path.namespace)
        .await
    {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(e) => error_response(e),
    }
}
