// Error types for exampro-shim

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShimError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Grading worker failed: {0}")]
    Grading(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShimError {
    /// HTTP status and envelope `type` for this error.
    pub fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ShimError::InvalidRequest(_) | ShimError::Json(_) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error")
            }
            ShimError::Config(_) | ShimError::ConfigParsing(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
            }
            ShimError::Upstream(_) | ShimError::Http(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            ShimError::Cache(_) => (StatusCode::INTERNAL_SERVER_ERROR, "cache_error"),
            ShimError::Grading(_) => (StatusCode::INTERNAL_SERVER_ERROR, "grading_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "api_error"),
        }
    }
}

// Convert ShimError to HTTP responses for Axum
impl IntoResponse for ShimError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();

        let body = json!({
            "type": "error",
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ShimError>;
