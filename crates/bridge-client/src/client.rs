//! Bridge HTTP client.

use crate::error::BridgeError;
use crate::types::*;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use urlencoding::encode;

/// Transport bridge REST API client.
#[derive(Clone)]
pub struct BridgeClient {
    client: Client,
    base_url: String,
}

impl BridgeClient {
    /// Create a new bridge client.
    pub fn new(base_url: impl Into<String>) -> Result<Self, BridgeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn session_url(&self, session_id: &str, suffix: &str) -> String {
        format!("{}/v1/sessions/{}{}", self.base_url, encode(session_id), suffix)
    }

    /// Check if the bridge is healthy.
    pub async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/v1/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Open a transport session for a phone number.
    #[instrument(skip(self, creds))]
    pub async fn open_session(
        &self,
        number: &str,
        creds: Option<serde_json::Value>,
    ) -> Result<String, BridgeError> {
        let request = OpenSessionRequest {
            number: number.to_string(),
            creds,
        };

        let response = self
            .client
            .post(format!("{}/v1/sessions", self.base_url))
            .json(&request)
            .send()
            .await?;

        let response = check(response).await?;
        let opened: OpenSessionResponse = response.json().await?;

        debug!(session_id = %opened.session_id, "Opened bridge session");
        Ok(opened.session_id)
    }

    /// Request a pairing code for the number bound to a session.
    ///
    /// When `preferred` is set the bridge is asked to reuse that code; it
    /// answers `409 Conflict` if the code is no longer valid.
    #[instrument(skip(self, preferred))]
    pub async fn request_pairing_code(
        &self,
        session_id: &str,
        number: &str,
        preferred: Option<&str>,
    ) -> Result<String, BridgeError> {
        let request = PairingCodeRequest {
            number: number.to_string(),
            code: preferred.map(String::from),
        };

        let response = self
            .client
            .post(self.session_url(session_id, "/pairing-code"))
            .json(&request)
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            let msg = response.text().await.unwrap_or_default();
            return Err(BridgeError::CodeRejected(msg));
        }

        let response = check(response).await?;
        let body: PairingCodeResponse = response.json().await?;
        Ok(body.code)
    }

    /// Send a text message from the session's account.
    #[instrument(skip(self, message))]
    pub async fn send(
        &self,
        session_id: &str,
        recipient: &str,
        message: &str,
    ) -> Result<(), BridgeError> {
        let request = SendMessageRequest {
            recipient: recipient.to_string(),
            message: message.to_string(),
        };

        let response = self
            .client
            .post(self.session_url(session_id, "/send"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let msg = response.text().await.unwrap_or_default();
            warn!("Send failed: {}", msg);
            return Err(BridgeError::SendFailed(msg));
        }

        debug!("Sent message to {}", recipient);
        Ok(())
    }

    /// Keep-alive ping.
    pub async fn ping(&self, session_id: &str) -> Result<(), BridgeError> {
        let response = self
            .client
            .post(self.session_url(session_id, "/ping"))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Fetch pending events for a session.
    #[instrument(skip(self))]
    pub async fn events(&self, session_id: &str) -> Result<Vec<BridgeEvent>, BridgeError> {
        let response = self
            .client
            .get(self.session_url(session_id, "/events"))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(BridgeError::SessionNotFound(session_id.to_string()));
        }

        let response = check(response).await?;
        let events: Vec<BridgeEvent> = response.json().await?;
        debug!("Received {} events", events.len());
        Ok(events)
    }

    /// Close a session. Closing an unknown session is not an error.
    #[instrument(skip(self))]
    pub async fn close(&self, session_id: &str) -> Result<(), BridgeError> {
        let response = self
            .client
            .delete(self.session_url(session_id, ""))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        check(response).await?;
        debug!(session_id = %session_id, "Closed bridge session");
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response, BridgeError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let msg = response.text().await.unwrap_or_default();
    Err(BridgeError::Api(format!("{} - {}", status, msg)))
}
