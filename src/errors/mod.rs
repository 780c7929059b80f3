//! Error types for the gateway.
//!
//! Split the same way the teacher splits `AppError`/`RepositoryError`: a startup-time
//! error (`ConfigError`) that never crosses an HTTP boundary, and a request-time error
//! (`GatewayError`) that implements `IntoResponse` directly so handlers can propagate
//! it with `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors raised while loading and validating `config.yaml`. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found at {path}")]
    MissingFile { path: String },

    #[error("failed to read config file {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to parse config: {message}")]
    Parse { message: String },

    #[error("invalid config: {message}")]
    Validation { message: String },
}

/// Errors raised while servicing a proxied request.
///
/// The 502-exhausted case is deliberately not a variant here: its body carries
/// `providers_tried`/`last_error` fields this flat taxonomy has no room for, so
/// the forward engine builds that response directly (see `proxy::forward`).
/// Every variant below maps to a concrete HTTP status so handlers can bubble
/// these up with `?` and let `IntoResponse` render the response.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({ "error": self.to_string() });
        tracing::warn!(status = %status, error = %self, "request failed");
        (status, axum::Json(body)).into_response()
    }
}
