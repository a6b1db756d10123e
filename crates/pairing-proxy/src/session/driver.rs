//! Per-attempt pairing driver.
//!
//! One task per attempt owns every piece of mutable lifecycle state (retry
//! count, cached code, confirmation flag). It connects, hands the pairing code
//! back to the caller through a one-shot reply, then reacts to transport
//! events until the credential is delivered or the attempt is given up.

use super::classifier::{DisconnectReason, Disposition};
use super::cleanup::DriverAction;
use super::manager::Shared;
use crate::error::PairingError;
use crate::registry::{format_pairing_code, PairingState};
use crate::storage::encode_credential_blob;
use crate::transport::{
    ConnectionUpdate, CredentialUpdate, TransportError, TransportEvent, TransportEvents,
    TransportSession,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

type Reply = oneshot::Sender<Result<Option<String>, PairingError>>;

/// How one connection ended.
enum Outcome {
    Disconnected(DisconnectReason),
    Finished,
}

pub(crate) struct Driver {
    shared: Arc<Shared>,
    phone_number: String,
    attempt: u64,
    reply: Option<Reply>,
    retry_count: u32,
    /// Raw code as returned by the transport, offered again on reconnect
    cached_code: Option<String>,
    confirmed: bool,
    safety_net_armed: bool,
}

impl Driver {
    pub(crate) fn new(shared: Arc<Shared>, phone_number: String, attempt: u64, reply: Reply) -> Self {
        Self {
            shared,
            phone_number,
            attempt,
            reply: Some(reply),
            retry_count: 0,
            cached_code: None,
            confirmed: false,
            safety_net_armed: false,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let outcome = match self.connect().await {
                Ok(Some((session, events))) => self.pump(session, events).await,
                Ok(None) => {
                    debug!(phone_number = %self.phone_number, attempt = self.attempt, "Attempt superseded, driver exiting");
                    Outcome::Finished
                }
                Err(e) if self.reply.is_some() => {
                    self.terminate(e).await;
                    Outcome::Finished
                }
                // Code requests are never retried automatically.
                Err(e @ PairingError::PairingCode(_)) => {
                    warn!(phone_number = %self.phone_number, attempt = self.attempt, "Pairing code request failed on reconnect: {}", e);
                    self.terminate(e).await;
                    Outcome::Finished
                }
                Err(e) => {
                    warn!(phone_number = %self.phone_number, attempt = self.attempt, "Reconnect failed: {}", e);
                    Outcome::Disconnected(DisconnectReason::ConnectionLost)
                }
            };

            match outcome {
                Outcome::Finished => return,
                Outcome::Disconnected(reason) => {
                    if !self.on_disconnect(reason).await {
                        return;
                    }
                }
            }
        }
    }

    /// Open a transport session and issue a pairing code if one is needed.
    ///
    /// Returns `None` when the attempt no longer owns its registry entry.
    async fn connect(
        &mut self,
    ) -> Result<Option<(Arc<dyn TransportSession>, TransportEvents)>, PairingError> {
        let number = self.phone_number.clone();
        let auth = self.shared.store.prepare(&number).await?;

        let (session, events) = self
            .shared
            .transport
            .open_session(&number, &auth)
            .await
            .map_err(|e| PairingError::Transport(e.to_string()))?;

        if !self
            .shared
            .registry
            .attach_transport(&number, self.attempt, session.clone())
            .await
        {
            session.close().await;
            return Ok(None);
        }

        if !self.safety_net_armed {
            self.shared
                .cleanup
                .schedule(&number, self.attempt, self.shared.config.pending_cleanup_delay)
                .await;
            self.safety_net_armed = true;
        }

        if auth.is_registered() {
            info!(phone_number = %number, attempt = self.attempt, "Stored credentials already registered, awaiting connection");
            self.set_state(PairingState::AwaitingConfirmation).await;
            self.send_reply(Ok(None));
            return Ok(Some((session, events)));
        }

        let code = match self.issue_code(session.as_ref()).await {
            Ok(code) => code,
            Err(e) => {
                if let Some(session) = self
                    .shared
                    .registry
                    .release_transport(&number, self.attempt)
                    .await
                {
                    session.close().await;
                }
                return Err(e);
            }
        };

        let recorded = code.clone();
        self.shared
            .registry
            .update(&number, self.attempt, move |s| {
                s.pairing_code = Some(recorded);
                s.set_state(PairingState::CodeIssued);
            })
            .await;

        info!(phone_number = %number, attempt = self.attempt, retry_count = self.retry_count, "Pairing code issued");
        self.send_reply(Ok(Some(code)));

        Ok(Some((session, events)))
    }

    /// Request a pairing code, reusing the cached one unless the transport
    /// rejects it.
    async fn issue_code(&mut self, session: &dyn TransportSession) -> Result<String, PairingError> {
        let number = self.phone_number.as_str();

        let raw = match self.cached_code.as_deref() {
            Some(cached) => match session.request_pairing_code(number, Some(cached)).await {
                Err(TransportError::PairingCodeRejected(reason)) => {
                    info!(phone_number = %number, %reason, "Cached pairing code rejected, generating a new one");
                    session.request_pairing_code(number, None).await
                }
                other => other,
            },
            None => session.request_pairing_code(number, None).await,
        }
        .map_err(|e| match e {
            TransportError::PairingCode(msg) => PairingError::PairingCode(msg),
            other => PairingError::PairingCode(other.to_string()),
        })?;

        let code = format_pairing_code(&raw);
        self.cached_code = Some(raw);
        Ok(code)
    }

    /// React to transport events until the connection opens or closes.
    async fn pump(
        &mut self,
        session: Arc<dyn TransportSession>,
        mut events: TransportEvents,
    ) -> Outcome {
        let mut keepalive = tokio::time::interval(self.shared.config.keepalive_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        keepalive.tick().await;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(TransportEvent::Credentials(update)) => self.on_credentials(update).await,
                    Some(TransportEvent::Connection(ConnectionUpdate::Connecting)) => {
                        debug!(phone_number = %self.phone_number, "Transport connecting");
                    }
                    Some(TransportEvent::Connection(ConnectionUpdate::Open { own_id })) => {
                        self.harvest(session.as_ref(), own_id).await;
                        return Outcome::Finished;
                    }
                    Some(TransportEvent::Connection(ConnectionUpdate::Close { reason })) => {
                        return Outcome::Disconnected(reason);
                    }
                    None => return Outcome::Disconnected(DisconnectReason::ConnectionLost),
                },
                _ = keepalive.tick(), if !self.confirmed => {
                    if let Err(e) = session.ping().await {
                        debug!(phone_number = %self.phone_number, "Keep-alive failed: {}", e);
                    }
                }
            }
        }
    }

    async fn on_credentials(&mut self, update: CredentialUpdate) {
        if let Err(e) = self.shared.store.save(&self.phone_number, &update.creds).await {
            warn!(phone_number = %self.phone_number, "Failed to persist credential update: {}", e);
            return;
        }

        if update.is_registered() && !self.confirmed {
            self.confirmed = true;
            info!(phone_number = %self.phone_number, attempt = self.attempt, "Pairing confirmed by remote device");
        }

        self.set_state(PairingState::AwaitingConfirmation).await;
    }

    /// Read back the credential, deliver it and complete the session.
    async fn harvest(&mut self, session: &dyn TransportSession, own_id: Option<String>) {
        let number = self.phone_number.clone();
        let shared = self.shared.clone();
        let config = &shared.config;

        self.set_state(PairingState::Harvesting).await;

        if !self.confirmed {
            tokio::time::sleep(config.settle_grace).await;
        }

        let raw = match self.shared.store.read_credentials(&number).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(phone_number = %number, "Failed to read harvested credentials: {}", e);
                self.terminate(e.into()).await;
                return;
            }
        };

        let blob = encode_credential_blob(&config.blob_prefix, &raw);
        let recipient = own_id
            .as_deref()
            .map(strip_device_suffix)
            .unwrap_or_else(|| config.default_owner.clone());

        if let Err(e) = session.send_message(&recipient, &blob).await {
            warn!(phone_number = %number, %recipient, "Failed to deliver credential: {}", e);
        }

        if let Some(notice) = &config.delivery_notice {
            if let Err(e) = session.send_message(&recipient, notice).await {
                warn!(phone_number = %number, %recipient, "Failed to deliver notice: {}", e);
            }
        }

        shared
            .registry
            .update(&number, self.attempt, move |s| {
                s.complete(blob);
            })
            .await;

        info!(phone_number = %number, attempt = self.attempt, %recipient, "Pairing completed, credential delivered");

        shared
            .cleanup
            .schedule(&number, self.attempt, config.completed_cleanup_delay)
            .await;
        self.send_reply(Ok(None));

        tokio::time::sleep(config.close_grace).await;

        if let Some(transport) = shared
            .registry
            .release_transport(&number, self.attempt)
            .await
        {
            transport.close().await;
        }
        shared
            .registry
            .release_handle(&number, self.attempt)
            .await;
    }

    /// Handle a closed connection. Returns true if the driver should reconnect.
    async fn on_disconnect(&mut self, reason: DisconnectReason) -> bool {
        let number = self.phone_number.clone();

        match self.shared.config.backoff.classify(reason) {
            Disposition::TerminalFatal => {
                warn!(phone_number = %number, attempt = self.attempt, %reason, "Session logged out");
                self.terminate(PairingError::LoggedOut).await;
                false
            }
            Disposition::TerminalForbidden => {
                warn!(phone_number = %number, attempt = self.attempt, %reason, "Phone number forbidden");
                self.terminate(PairingError::Forbidden).await;
                false
            }
            Disposition::Retryable(delay) => {
                self.retry_count += 1;
                let retry_count = self.retry_count;

                if let Some(transport) = self
                    .shared
                    .registry
                    .release_transport(&number, self.attempt)
                    .await
                {
                    transport.close().await;
                }

                if retry_count >= self.shared.config.max_retries {
                    self.exhaust().await;
                    return false;
                }

                warn!(phone_number = %number, attempt = self.attempt, %reason, retry_count, ?delay, "Connection closed, reconnecting");

                self.shared
                    .registry
                    .update(&number, self.attempt, move |s| {
                        s.retry_count = retry_count;
                        s.set_state(PairingState::Reconnecting);
                    })
                    .await;

                tokio::time::sleep(delay).await;

                if !self.confirmed {
                    if let Err(e) = self.shared.store.reset(&number).await {
                        warn!(phone_number = %number, "Failed to reset session storage: {}", e);
                    }
                }

                true
            }
        }
    }

    /// Give up after the retry cap. The failed snapshot stays visible until
    /// the short cleanup fires.
    async fn exhaust(&mut self) {
        let number = self.phone_number.clone();
        let retry_count = self.retry_count;

        error!(phone_number = %number, attempt = self.attempt, retry_count, "Retries exhausted, giving up");

        self.shared
            .registry
            .update(&number, self.attempt, move |s| {
                s.retry_count = retry_count;
                s.fail();
            })
            .await;

        if let Err(e) = self.shared.store.erase(&number).await {
            warn!(phone_number = %number, "Failed to erase session storage: {}", e);
        }

        self.shared
            .cleanup
            .schedule(&number, self.attempt, self.shared.config.exhausted_cleanup_delay)
            .await;

        self.send_reply(Err(PairingError::RetryExhausted(retry_count)));
    }

    /// End the attempt immediately: mark it failed, tear everything down and
    /// report `error` if the caller is still waiting.
    async fn terminate(&mut self, error: PairingError) {
        self.shared
            .registry
            .update(&self.phone_number, self.attempt, |s| {
                s.fail();
            })
            .await;

        self.shared
            .cleanup
            .teardown(&self.phone_number, self.attempt, DriverAction::Keep)
            .await;

        info!(phone_number = %self.phone_number, attempt = self.attempt, %error, "Pairing attempt terminated");
        self.send_reply(Err(error));
    }

    async fn set_state(&self, state: PairingState) {
        self.shared
            .registry
            .update(&self.phone_number, self.attempt, move |s| {
                s.set_state(state);
            })
            .await;
    }

    fn send_reply(&mut self, result: Result<Option<String>, PairingError>) {
        if let Some(reply) = self.reply.take() {
            if reply.send(result).is_err() {
                debug!(phone_number = %self.phone_number, "Caller no longer waiting for a result");
            }
        }
    }
}

/// Strip the device suffix from an account id (`user:device@domain`).
fn strip_device_suffix(id: &str) -> String {
    match id.split_once('@') {
        Some((user, domain)) => {
            let user = user.split(':').next().unwrap_or(user);
            format!("{}@{}", user, domain)
        }
        None => id.split(':').next().unwrap_or(id).to_string(),
    }
}
