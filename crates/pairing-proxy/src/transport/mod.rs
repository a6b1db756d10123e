//! Messaging transport boundary.
//!
//! The lifecycle manager consumes the transport as an opaque capability: open
//! a session from stored credentials, request a pairing code, send messages,
//! ping, close. Connection-state and credential notifications arrive on one
//! ordered channel per session.

mod bridge;

pub use bridge::{BridgeSession, BridgeTransport};

use crate::session::DisconnectReason;
use crate::storage::AuthState;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to open session: {0}")]
    Open(String),

    /// The transport refused to reuse a previously issued pairing code.
    #[error("Pairing code rejected: {0}")]
    PairingCodeRejected(String),

    #[error("Pairing code request failed: {0}")]
    PairingCode(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Transport error: {0}")]
    Other(String),
}

impl From<bridge_client::BridgeError> for TransportError {
    fn from(e: bridge_client::BridgeError) -> Self {
        use bridge_client::BridgeError;
        match e {
            BridgeError::CodeRejected(msg) => TransportError::PairingCodeRejected(msg),
            BridgeError::SendFailed(msg) => TransportError::Send(msg),
            other => TransportError::Other(other.to_string()),
        }
    }
}

/// Connection-state notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionUpdate {
    Connecting,
    /// Connection is up. `own_id` is the account's own identifier once the
    /// transport has resolved it.
    Open { own_id: Option<String> },
    Close { reason: DisconnectReason },
}

/// Credential-update notification; the payload must be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialUpdate {
    pub creds: serde_json::Value,
}

impl CredentialUpdate {
    /// Whether the remote device has accepted the pairing.
    pub fn is_registered(&self) -> bool {
        self.creds
            .get("registered")
            .and_then(|r| r.as_bool())
            .unwrap_or(false)
    }
}

/// Events emitted by a transport session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connection(ConnectionUpdate),
    Credentials(CredentialUpdate),
}

/// Ordered event feed of one transport session.
pub type TransportEvents = mpsc::Receiver<TransportEvent>;

/// Factory for transport sessions.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a session for `phone_number` from its stored authentication state.
    async fn open_session(
        &self,
        phone_number: &str,
        auth: &AuthState,
    ) -> Result<(Arc<dyn TransportSession>, TransportEvents), TransportError>;

    /// Coarse reachability check for health reporting.
    async fn health_check(&self) -> bool {
        true
    }
}

/// One live connection to the messaging network.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Request a pairing code for `phone_number`.
    ///
    /// `preferred` asks the transport to reuse an earlier code; it answers
    /// [`TransportError::PairingCodeRejected`] when that code is no longer
    /// valid.
    async fn request_pairing_code(
        &self,
        phone_number: &str,
        preferred: Option<&str>,
    ) -> Result<String, TransportError>;

    /// Send an application message.
    async fn send_message(&self, recipient: &str, text: &str) -> Result<(), TransportError>;

    /// Keep-alive signal.
    async fn ping(&self) -> Result<(), TransportError>;

    /// Close the session. Must be safe to call more than once.
    async fn close(&self);
}
