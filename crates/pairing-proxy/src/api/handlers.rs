//! HTTP request handlers.

use super::types::{HealthResponse, PairRequest, PairResponse, SessionResponse, StatusResponse};
use super::AppState;
use crate::error::ProxyError;
use crate::registry::{normalize_phone_number, PairingSession, SessionStatus};
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use tracing::info;

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.manager.registry();

    Json(HealthResponse {
        success: true,
        status: "ok".to_string(),
        active_sessions: registry.count().await,
        live_transports: registry.live_count().await,
        transport_healthy: state.manager.transport_healthy().await,
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Start pairing a phone number and return its pairing code.
pub async fn pair(
    State(state): State<AppState>,
    Json(request): Json<PairRequest>,
) -> Result<Json<PairResponse>, ProxyError> {
    info!(phone_number = %request.number, "Pairing request received");

    let pairing_code = state.manager.start(&request.number).await?;

    let message = match pairing_code {
        Some(_) => "Enter the pairing code on the device to link this number.",
        None => "Credentials already registered, completing pairing.",
    };

    Ok(Json(PairResponse {
        success: true,
        pairing_code,
        message: message.to_string(),
    }))
}

/// Get pairing status for a phone number.
pub async fn get_status(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<Json<StatusResponse>, ProxyError> {
    let (_, session) = lookup(&state, &number).await?;

    let (pairing_code, message) = match session.status {
        SessionStatus::Pending => (session.pairing_code, None),
        SessionStatus::Completed => (None, Some("Pairing completed.".to_string())),
        SessionStatus::Failed => (None, Some("Pairing failed.".to_string())),
    };

    Ok(Json(StatusResponse {
        success: true,
        status: session.status,
        timestamp: session.updated_at.to_rfc3339(),
        retry_count: session.retry_count,
        pairing_code,
        message,
    }))
}

/// Get the harvested credential for a completed pairing.
pub async fn get_session(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<Json<SessionResponse>, ProxyError> {
    let (number, session) = lookup(&state, &number).await?;

    match (session.status, session.credential_blob) {
        (SessionStatus::Completed, Some(blob)) => Ok(Json(SessionResponse {
            success: true,
            session_id: blob,
        })),
        _ => Err(ProxyError::NotCompleted(number)),
    }
}

/// Find the recorded session for a number. A malformed number can never
/// have one.
async fn lookup(state: &AppState, number: &str) -> Result<(String, PairingSession), ProxyError> {
    let number =
        normalize_phone_number(number).map_err(|_| ProxyError::NotFound(number.to_string()))?;

    let session = state
        .manager
        .registry()
        .get(&number)
        .await
        .ok_or_else(|| ProxyError::NotFound(number.clone()))?;

    Ok((number, session))
}
