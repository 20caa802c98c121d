//! GET `/configfiles/json/{appId}/{clusterName}/{namespace}`

use actix_web::{HttpResponse, http::StatusCode, web};
use serde::Deserialize;

use beacon_common::error::RESOURCE_NOT_FOUND;
use beacon_release::model::ClientIdentity;

use super::NamespacePath;
use crate::model::AppState;
use crate::model::response::{ErrorResult, error_response};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFileQuery {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub data_center: Option<String>,
}

/// Resolved configuration as a flat JSON object
pub async fn get_configfiles_json(
    state: web::Data<AppState>,
    path: web::Path<NamespacePath>,
    query: web::Query<ConfigFileQuery>,
) -> HttpResponse {
    let client = ClientIdentity::new(
        &path.app_id,
        query.ip.as_deref(),
        query.data_center.as_deref(),
    );
    match state
        .engine
        .config_file_service()
        .query_config_as_json(&path.app_id, &path.cluster_name, &path.namespace, &client)
        .await
    {
        Ok(Some(json)) => HttpResponse::Ok()
            .content_type("application/json;charset=UTF-8")
            .body(json),
        Ok(None) => ErrorResult::http_response(
            StatusCode::NOT_FOUND,
            RESOURCE_NOT_FOUND,
            format!("No configurations published for {}", path.namespace),
        ),
        Err(e) => error_response(e),
    }
}
