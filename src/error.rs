//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Raised while validating a configuration or planning routes. Aborts the build.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cannot simultaneously specify both include columns and exclude columns")]
    IncludeAndExclude,
    #[error("the primary key '{primary_key}' must be included for APIs with POST")]
    PrimaryKeyNotIncluded { primary_key: String },
    #[error("collection name 'eval' is reserved when function evaluation is allowed")]
    ReservedCollectionName,
    #[error("unknown HTTP method: {0}")]
    UnknownMethod(String),
    #[error(
        "invalid pagination: results_per_page {results_per_page}, \
         max_results_per_page {max_results_per_page}"
    )]
    InvalidPagination {
        results_per_page: u32,
        max_results_per_page: u32,
    },
    #[error("invalid collection name: '{0}'")]
    InvalidCollectionName(String),
    #[error("invalid url prefix: '{0}'")]
    InvalidUrlPrefix(String),
    #[error("model '{0}' has no primary key")]
    MissingPrimaryKey(String),
    #[error("config load: {0}")]
    Load(String),
}

/// Raised by the manager façade: attachment, lookup and registration on a host.
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("restless has already been initialized on this application: {0}")]
    AlreadyInitialized(uuid::Uuid),
    #[error("no API has been created for model '{0}'")]
    UnknownModel(String),
    #[error("could not build url for endpoint '{endpoint}' with parameters {params:?}")]
    NoMatchingRoute {
        endpoint: String,
        params: Vec<String>,
    },
    #[error("route conflict: {method} {path} is already registered")]
    RouteConflict { method: String, path: String },
    #[error("routing group '{0}' is already registered on this application")]
    DuplicateGroup(String),
    #[error("manager is not attached to any application")]
    NotAttached,
}

/// Errors surfaced while handling a single request.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("validation: {kind}")]
    Validation {
        kind: String,
        errors: BTreeMap<String, String>,
    },
    #[error("{message}")]
    Processing { status: StatusCode, message: String },
    #[error("session: {0}")]
    Session(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Processing { status, .. } => *status,
            AppError::Db(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Session(_) | AppError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::MethodNotAllowed(_) => "method_not_allowed",
            AppError::Validation { .. } => "validation_error",
            AppError::Processing { .. } => "processing_error",
            AppError::Db(sqlx::Error::RowNotFound) => "not_found",
            AppError::Session(_) => "session_error",
            AppError::Db(_) => "database_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self {
            AppError::Validation { errors, .. } => {
                Some(serde_json::json!({ "validation_errors": errors }))
            }
            _ => None,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_error_keeps_hook_status() {
        let err = AppError::Processing {
            status: StatusCode::UNAUTHORIZED,
            message: "not logged in".into(),
        };
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "not logged in");
    }

    #[test]
    fn row_not_found_maps_to_404() {
        assert_eq!(AppError::Db(sqlx::Error::RowNotFound).status(), StatusCode::NOT_FOUND);
    }
}
