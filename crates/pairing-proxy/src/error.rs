//! Error types for the pairing proxy.

use crate::storage::StorageError;
use crate::transport::TransportError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by the session lifecycle.
///
/// Retryable disconnects never appear here; they are handled inside the
/// session driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PairingError {
    #[error("Invalid phone number format: {0}")]
    InvalidPhoneNumber(String),

    #[error("A pairing session is already active for {0}")]
    SessionActive(String),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("Session logged out by the remote device")]
    LoggedOut,

    #[error("Phone number is forbidden by the messaging network")]
    Forbidden,

    #[error("Connection retries exhausted after {0} attempts")]
    RetryExhausted(u32),

    #[error("Failed to generate pairing code: {0}")]
    PairingCode(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for PairingError {
    fn from(e: StorageError) -> Self {
        PairingError::Storage(e.to_string())
    }
}

impl From<TransportError> for PairingError {
    fn from(e: TransportError) -> Self {
        PairingError::Transport(e.to_string())
    }
}

/// HTTP-facing error types.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Pairing(#[from] PairingError),

    #[error("No session found for {0}")]
    NotFound(String),

    #[error("Pairing for {0} has not completed yet")]
    NotCompleted(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl ProxyError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ProxyError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ProxyError::NotCompleted(_) => (StatusCode::BAD_REQUEST, "NOT_COMPLETED"),
            ProxyError::Pairing(e) => match e {
                PairingError::InvalidPhoneNumber(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_PHONE_NUMBER")
                }
                PairingError::SessionActive(_) => (StatusCode::BAD_REQUEST, "SESSION_ACTIVE"),
                PairingError::PairingCode(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "PAIRING_CODE_ERROR")
                }
                PairingError::LoggedOut => (StatusCode::BAD_GATEWAY, "LOGGED_OUT"),
                PairingError::Forbidden => (StatusCode::BAD_GATEWAY, "FORBIDDEN"),
                PairingError::RetryExhausted(_) => (StatusCode::BAD_GATEWAY, "RETRY_EXHAUSTED"),
                PairingError::Transport(_) => (StatusCode::BAD_GATEWAY, "TRANSPORT_ERROR"),
                PairingError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
                PairingError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
