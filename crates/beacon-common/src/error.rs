//! Error types and error codes for Beacon
//!
//! This module defines:
//! - `BeaconError`: Caller-visible error enum raised by the release engine
//! - `AppError`: Wrapper for integration with web frameworks
//! - `ErrorCode`: Structured error codes for API responses

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum BeaconError {
    #[error("caused: {0}")]
    IllegalArgument(String),

    #[error("namespace not exist: {0}")]
    NamespaceNotExist(String),

    #[error("item not exist: {0}")]
    ItemNotExist(i64),

    #[error("release not found: {0}")]
    ReleaseNotExist(i64),

    #[error("namespace:{namespace} is modified by {owner}")]
    NamespaceLocked { namespace: String, owner: String },

    #[error("Check lock for {0} failed, please retry.")]
    LockCheckFailed(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl BeaconError {
    /// Whether the error means the addressed resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BeaconError::NamespaceNotExist(_)
                | BeaconError::ItemNotExist(_)
                | BeaconError::ReleaseNotExist(_)
        )
    }

    /// Structured code reported alongside the message
    pub fn error_code(&self) -> ErrorCode<'static> {
        match self {
            BeaconError::IllegalArgument(_) => PARAMETER_VALIDATE_ERROR,
            BeaconError::NamespaceNotExist(_)
            | BeaconError::ItemNotExist(_)
            | BeaconError::ReleaseNotExist(_) => RESOURCE_NOT_FOUND,
            BeaconError::NamespaceLocked { .. } => NAMESPACE_LOCKED,
            BeaconError::LockCheckFailed(_) => RESOURCE_CONFLICT,
            BeaconError::DatabaseError(_) => DATA_ACCESS_ERROR,
            BeaconError::ConfigError(_) => SERVER_ERROR,
        }
    }
}

/// Wrapper for application errors
#[derive(Debug)]
pub struct AppError {
    inner: anyhow::Error,
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError { inner: value }
    }
}

impl AppError {
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// The `BeaconError` carried by this error, if any
    pub fn beacon_error(&self) -> Option<&BeaconError> {
        self.downcast_ref::<BeaconError>()
    }
}

/// Error code structure for API responses
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    code: 0,
    message: "success",
};

pub const PARAMETER_MISSING: ErrorCode<'static> = ErrorCode {
    code: 10000,
    message: "parameter missing",
};

pub const DATA_ACCESS_ERROR: ErrorCode<'static> = ErrorCode {
    code: 10002,
    message: "data access error",
};

pub const PARAMETER_VALIDATE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 20002,
    message: "parameter validate error",
};

pub const RESOURCE_NOT_FOUND: ErrorCode<'static> = ErrorCode {
    code: 20004,
    message: "resource not found",
};

pub const RESOURCE_CONFLICT: ErrorCode<'static> = ErrorCode {
    code: 20005,
    message: "resource conflict",
};

pub const NAMESPACE_LOCKED: ErrorCode<'static> = ErrorCode {
    code: 20101,
    message: "namespace locked by another editor",
};

pub const SERVER_ERROR: ErrorCode<'static> = ErrorCode {
    code: 30000,
    message: "server error",
};
