//! Domain error types.

use thiserror::Error;

use crate::retry::IsTransient;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The request could not be attributed to the partner.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// No handler is registered for the event type.
    #[error("unsupported event type: {0}")]
    UnsupportedEvent(String),

    /// The payload could not be read as a partner event.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// An order was not found.
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// An outbound call to the partner failed.
    #[error("partner error: {0}")]
    Partner(#[from] PartnerError),
}

impl IsTransient for DomainError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Infrastructure(_) => true,
            Self::Partner(err) => err.is_transient(),
            _ => false,
        }
    }
}

/// Errors raised by the partner API client.
#[derive(Debug, Clone, Error)]
pub enum PartnerError {
    /// The partner refused the request with a non-retryable status.
    #[error("partner rejected request (HTTP {status}): {body}")]
    Rejected {
        /// HTTP status code returned by the partner.
        status: u16,
        /// Response body, as returned.
        body: String,
    },

    /// The partner answered with a retryable status (408, 429, 5xx).
    #[error("partner unavailable (HTTP {status}): {body}")]
    Unavailable {
        /// HTTP status code returned by the partner.
        status: u16,
        /// Response body, as returned.
        body: String,
    },

    /// The bearer token was refused; a fresh token may succeed.
    #[error("partner refused credentials: {0}")]
    Unauthorized(String),

    /// Timeout, connection failure, or another transport-level error.
    #[error("partner transport error: {0}")]
    Transport(String),

    /// The partner answered but the body could not be understood.
    #[error("invalid partner response: {0}")]
    InvalidResponse(String),

    /// No partner client is configured for the requested environment.
    #[error("partner environment not configured: {0}")]
    NotConfigured(String),
}

impl IsTransient for PartnerError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Unauthorized(_) | Self::Transport(_)
        )
    }
}
