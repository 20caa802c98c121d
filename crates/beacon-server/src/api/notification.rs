//! GET `/notifications/v2`: long polling for release changes

use actix_web::{HttpResponse, web};
use serde::Deserialize;

use beacon_release::model::NotificationRequest;

use crate::model::AppState;
use crate::model::response::{ErrorResult, error_response};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    pub app_id: String,
    pub cluster: String,
    /// JSON array of `{"namespaceName":..,"notificationId":..}`
    pub notifications: String,
    #[serde(default)]
    pub data_center: Option<String>,
}

impl NotificationQuery {
    pub fn parse_notifications(&self) -> Result<Vec<NotificationRequest>, serde_json::Error> {
        serde_json::from_str(&self.notifications)
    }
}

/// Answers at once when any namespace is behind, otherwise holds the request
/// until a change arrives or the polling timeout elapses (`[]`)
pub async fn get_notifications(
    state: web::Data<AppState>,
    query: web::Query<NotificationQuery>,
) -> HttpResponse {
    let notifications = match query.parse_notifications() {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!("Failed to parse notifications: {}", e);
            return ErrorResult::bad_request(format!("Invalid notifications format: {}", e));
        }
    };

    match state
        .engine
        .notification_service()
        .poll_notifications(
            &query.app_id,
            &query.cluster,
            query.data_center.as_deref(),
            notifications,
        )
        .await
    {
        Ok(results) => HttpResponse::Ok().json(results),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notifications() {
        let query = NotificationQuery {
            app_id: "app1".to_string(),
            cluster: "default".to_string(),
            notifications: r#"[{"namespaceName":"application","notificationId":-1}]"#
                .to_string(),
            data_center: None,
        };
        let notifications = query.parse_notifications().unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].namespace_name, "application");
        assert_eq!(notifications[0].notification_id, -1);
    }
}
