//! Bridge API types.

use serde::{Deserialize, Serialize};

/// Request to open a transport session.
#[derive(Debug, Clone, Serialize)]
pub struct OpenSessionRequest {
    pub number: String,
    /// Previously persisted credentials, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creds: Option<serde_json::Value>,
}

/// Response after opening a transport session.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenSessionResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// Pairing code request.
#[derive(Debug, Clone, Serialize)]
pub struct PairingCodeRequest {
    pub number: String,
    /// Code the bridge should reuse instead of generating a new one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Pairing code response.
#[derive(Debug, Clone, Deserialize)]
pub struct PairingCodeResponse {
    pub code: String,
}

/// Outgoing message request.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    pub recipient: String,
    pub message: String,
}

/// Connection state reported by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Close,
}

/// Event emitted by a bridge session, in the order the engine produced it.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BridgeEvent {
    /// Connection state change.
    Connection {
        connection: ConnectionState,
        /// Disconnect status code (only on `close`).
        #[serde(rename = "statusCode")]
        status_code: Option<u16>,
        /// The account's own identifier (only on `open`).
        #[serde(rename = "ownId")]
        own_id: Option<String>,
    },
    /// Credentials changed and should be persisted.
    Creds { creds: serde_json::Value },
}

impl BridgeEvent {
    /// Whether this event closes the session.
    pub fn is_close(&self) -> bool {
        matches!(
            self,
            BridgeEvent::Connection {
                connection: ConnectionState::Close,
                ..
            }
        )
    }
}
