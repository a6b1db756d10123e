//! Transport implementation backed by the REST bridge.

use super::{
    ConnectionUpdate, CredentialUpdate, Transport, TransportError, TransportEvent,
    TransportEvents, TransportSession,
};
use crate::session::DisconnectReason;
use crate::storage::AuthState;
use async_trait::async_trait;
use bridge_client::{BridgeClient, BridgeEvent, ConnectionState, EventReceiver};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_stream::StreamExt;
use tracing::{debug, instrument, warn};

/// Capacity of the per-session event channel.
const EVENT_BUFFER: usize = 64;

/// [`Transport`] that drives sessions on the bridge service.
#[derive(Clone)]
pub struct BridgeTransport {
    client: BridgeClient,
    poll_interval: Duration,
}

impl BridgeTransport {
    pub fn new(client: BridgeClient, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    #[instrument(skip(self, auth))]
    async fn open_session(
        &self,
        phone_number: &str,
        auth: &AuthState,
    ) -> Result<(Arc<dyn TransportSession>, TransportEvents), TransportError> {
        let session_id = self
            .client
            .open_session(phone_number, auth.creds.clone())
            .await
            .map_err(|e| TransportError::Open(e.to_string()))?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let receiver = EventReceiver::new(self.client.clone(), session_id.clone(), self.poll_interval);
        let forwarder = tokio::spawn(forward_events(receiver, tx));

        let session = BridgeSession {
            client: self.client.clone(),
            session_id,
            forwarder: forwarder.abort_handle(),
        };

        Ok((Arc::new(session), rx))
    }

    async fn health_check(&self) -> bool {
        self.client.health_check().await
    }
}

/// One bridge session plus the task forwarding its events.
pub struct BridgeSession {
    client: BridgeClient,
    session_id: String,
    forwarder: AbortHandle,
}

#[async_trait]
impl TransportSession for BridgeSession {
    async fn request_pairing_code(
        &self,
        phone_number: &str,
        preferred: Option<&str>,
    ) -> Result<String, TransportError> {
        self.client
            .request_pairing_code(&self.session_id, phone_number, preferred)
            .await
            .map_err(|e| match TransportError::from(e) {
                TransportError::Other(msg) => TransportError::PairingCode(msg),
                other => other,
            })
    }

    async fn send_message(&self, recipient: &str, text: &str) -> Result<(), TransportError> {
        Ok(self.client.send(&self.session_id, recipient, text).await?)
    }

    async fn ping(&self) -> Result<(), TransportError> {
        Ok(self.client.ping(&self.session_id).await?)
    }

    async fn close(&self) {
        self.forwarder.abort();
        if let Err(e) = self.client.close(&self.session_id).await {
            warn!(session_id = %self.session_id, "Failed to close bridge session: {}", e);
        }
    }
}

async fn forward_events(receiver: EventReceiver, tx: mpsc::Sender<TransportEvent>) {
    let mut stream = Box::pin(receiver.stream());

    while let Some(event) = stream.next().await {
        if tx.send(convert_event(event)).await.is_err() {
            debug!("Event consumer dropped, stopping forwarder");
            break;
        }
    }
}

fn convert_event(event: BridgeEvent) -> TransportEvent {
    match event {
        BridgeEvent::Connection {
            connection,
            status_code,
            own_id,
        } => TransportEvent::Connection(match connection {
            ConnectionState::Connecting => ConnectionUpdate::Connecting,
            ConnectionState::Open => ConnectionUpdate::Open { own_id },
            ConnectionState::Close => ConnectionUpdate::Close {
                reason: DisconnectReason::from_status(status_code),
            },
        }),
        BridgeEvent::Creds { creds } => TransportEvent::Credentials(CredentialUpdate { creds }),
    }
}
