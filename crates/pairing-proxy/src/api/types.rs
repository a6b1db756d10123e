//! API request and response types.

use crate::registry::SessionStatus;
use serde::{Deserialize, Serialize};

/// Request to start pairing a phone number.
#[derive(Debug, Deserialize)]
pub struct PairRequest {
    /// Phone number, with or without a leading `+`
    pub number: String,
}

/// Response after starting a pairing attempt.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairResponse {
    pub success: bool,
    /// Absent when the stored credentials were already registered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_code: Option<String>,
    pub message: String,
}

/// Pairing status response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub status: SessionStatus,
    pub timestamp: String,
    pub retry_count: u32,
    /// Only while pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Harvested credential response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    pub session_id: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub success: bool,
    pub status: String,
    pub active_sessions: usize,
    pub live_transports: usize,
    pub transport_healthy: bool,
    pub timestamp: String,
}
