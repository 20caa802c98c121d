//! GET `/configs/{appId}/{clusterName}/{namespace}`

use actix_web::{HttpResponse, http::StatusCode, web};
use serde::Deserialize;

use beacon_common::error::RESOURCE_NOT_FOUND;
use beacon_common::utils::normalize_namespace;
use beacon_release::model::{ClientIdentity, ConfigResponse, NotificationMessages};

use super::NamespacePath;
use crate::model::AppState;
use crate::model::response::{ErrorResult, error_response};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigQuery {
    /// Client's current release key, `-1` when it has none
    #[serde(default = "default_release_key")]
    pub release_key: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub data_center: Option<String>,
    /// Notification messages JSON the client last received
    #[serde(default)]
    pub messages: Option<String>,
}

fn default_release_key() -> String {
    "-1".to_string()
}

/// Get configuration
///
/// - 200 OK: resolved release
/// - 304 Not Modified: client already holds the resolved release key
/// - 404 Not Found: nothing published for any fallback tier
pub async fn get_config(
    state: web::Data<AppState>,
    path: web::Path<NamespacePath>,
    query: web::Query<ConfigQuery>,
) -> HttpResponse {
    let namespace = normalize_namespace(&path.namespace);
    let client = ClientIdentity::new(
        &path.app_id,
        query.ip.as_deref(),
        query.data_center.as_deref(),
    );
    let messages = NotificationMessages::from_query(query.messages.as_deref());

    let release = match state
        .engine
        .config_service()
        .load_config(
            &client,
            &path.app_id,
            &path.cluster_name,
            namespace,
            messages.as_ref(),
        )
        .await
    {
        Ok(Some(release)) => release,
        Ok(None) => {
            return ErrorResult::http_response(
                StatusCode::NOT_FOUND,
                RESOURCE_NOT_FOUND,
                format!(
                    "Could not load configurations with appId: {}, clusterName: {}, namespace: {}",
                    path.app_id, path.cluster_name, namespace
                ),
            );
        }
        Err(e) => return error_response(e),
    };

    if release.release_key == query.release_key {
        return HttpResponse::NotModified().finish();
    }

    match ConfigResponse::from_release(&path.app_id, namespace, &release) {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_query_defaults() {
        let query: ConfigQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.release_key, "-1");
        assert!(query.ip.is_none());

        let query: ConfigQuery =
            serde_json::from_str(r#"{"releaseKey":"abc","dataCenter":"east"}"#).unwrap();
        assert_eq!(query.release_key, "abc");
        assert_eq!(query.data_center.as_deref(), Some("east"));
    }
}
