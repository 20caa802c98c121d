//! GET `/health`

use actix_web::{HttpResponse, web};
use serde_json::json;

use crate::model::AppState;

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let persistence = state.engine.persistence();
    match persistence.health_check().await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "status": "UP",
            "storageMode": persistence.storage_mode().to_string(),
        })),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "DOWN",
                "message": e.to_string(),
            }))
        }
    }
}
