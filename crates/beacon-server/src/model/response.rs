//! HTTP response bodies and error mapping

use actix_web::{HttpResponse, HttpResponseBuilder, http::StatusCode};
use serde::{Deserialize, Serialize};

use beacon_common::error::{ErrorCode, SERVER_ERROR};
use beacon_common::{AppError, BeaconError};

/// Error body returned for rejected requests
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResult {
    pub timestamp: String,
    pub status: u16,
    pub code: i32,
    pub error: String,
    pub message: String,
}

impl ErrorResult {
    pub fn new(status: StatusCode, code: ErrorCode<'_>, message: String) -> Self {
        ErrorResult {
            timestamp: chrono::Utc::now().to_rfc3339(),
            status: status.as_u16(),
            code: code.code,
            error: status.canonical_reason().unwrap_or_default().to_string(),
            message,
        }
    }

    pub fn http_response(status: StatusCode, code: ErrorCode<'_>, message: String) -> HttpResponse {
        HttpResponseBuilder::new(status).json(ErrorResult::new(status, code, message))
    }

    pub fn bad_request(message: String) -> HttpResponse {
        Self::http_response(
            StatusCode::BAD_REQUEST,
            beacon_common::error::PARAMETER_VALIDATE_ERROR,
            message,
        )
    }
}

/// Status for a service error: caller mistakes are 4xx, the rest 500
pub fn status_of(error: &BeaconError) -> StatusCode {
    match error {
        BeaconError::NamespaceNotExist(_)
        | BeaconError::ItemNotExist(_)
        | BeaconError::ReleaseNotExist(_) => StatusCode::NOT_FOUND,
        BeaconError::IllegalArgument(_)
        | BeaconError::NamespaceLocked { .. }
        | BeaconError::LockCheckFailed(_) => StatusCode::BAD_REQUEST,
        BeaconError::DatabaseError(_) | BeaconError::ConfigError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Render a service error
pub fn error_response(error: anyhow::Error) -> HttpResponse {
    let error = AppError::from(error);
    match error.beacon_error() {
        Some(beacon_error) => {
            let status = status_of(beacon_error);
            if status.is_server_error() {
                tracing::error!("Request failed: {}", error);
            }
            ErrorResult::http_response(status, beacon_error.error_code(), error.to_string())
        }
        None => {
            tracing::error!("Request failed: {:#}", error.inner());
            ErrorResult::http_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                SERVER_ERROR,
                error.to_string(),
            )
        }
    }
}
