//! Bridge client errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Pairing code rejected: {0}")]
    CodeRejected(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}
