//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orderhook_core::error::{DomainError, PartnerError};
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A partner client could not be built.
    #[error("partner client error: {0}")]
    Partner(#[from] PartnerError),

    /// Tracing or span export could not be set up.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorBody {
    /// Builds a response with this body and `status`.
    #[must_use]
    pub fn respond(status: StatusCode, error: &'static str, message: impl Into<String>) -> Response {
        let body = Self {
            error,
            message: message.into(),
        };
        (status, Json(body)).into_response()
    }
}

/// HTTP-layer wrapper around `DomainError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            DomainError::Authentication(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            DomainError::UnsupportedEvent(_) => (StatusCode::BAD_REQUEST, "unsupported_event"),
            DomainError::MalformedEvent(_) => (StatusCode::BAD_REQUEST, "malformed_event"),
            DomainError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "order_not_found"),
            DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            DomainError::Infrastructure(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            DomainError::Partner(err) => match err {
                PartnerError::Rejected { .. } | PartnerError::InvalidResponse(_) => {
                    (StatusCode::BAD_GATEWAY, "partner_rejected")
                }
                PartnerError::Unavailable { .. }
                | PartnerError::Unauthorized(_)
                | PartnerError::Transport(_)
                | PartnerError::NotConfigured(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "partner_unavailable")
                }
            },
        };

        // Signature and storage failures say nothing about internals.
        let message = match &self.0 {
            DomainError::Authentication(_) => "request could not be authenticated".to_owned(),
            DomainError::Infrastructure(_) => {
                "the service is temporarily unable to process the request".to_owned()
            }
            other => other.to_string(),
        };

        ErrorBody::respond(status, error_code, message)
    }
}
