//! Session lifecycle manager.

use super::cleanup::CleanupScheduler;
use super::driver::Driver;
use crate::config::PairingConfig;
use crate::error::PairingError;
use crate::registry::{normalize_phone_number, PairingSession, SessionRegistry};
use crate::storage::AuthStore;
use crate::transport::Transport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;

/// State shared by the manager and every driver it spawns.
pub(crate) struct Shared {
    pub registry: SessionRegistry,
    pub store: AuthStore,
    pub transport: Arc<dyn Transport>,
    pub config: PairingConfig,
    pub cleanup: CleanupScheduler,
    next_attempt: AtomicU64,
}

/// Starts pairing attempts and owns their shared collaborators.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    pub fn new(
        registry: SessionRegistry,
        store: AuthStore,
        transport: Arc<dyn Transport>,
        config: PairingConfig,
    ) -> Self {
        let cleanup = CleanupScheduler::new(registry.clone(), store.clone());

        Self {
            shared: Arc::new(Shared {
                registry,
                store,
                transport,
                config,
                cleanup,
                next_attempt: AtomicU64::new(1),
            }),
        }
    }

    /// Start a pairing attempt for `phone_number`.
    ///
    /// Resolves as soon as a pairing code is available, with `None` when the
    /// stored credentials are already registered and no code is needed. The
    /// attempt keeps running in the background until it completes or fails.
    pub async fn start(&self, phone_number: &str) -> Result<Option<String>, PairingError> {
        let number = normalize_phone_number(phone_number).map_err(PairingError::InvalidPhoneNumber)?;
        let attempt = self.shared.next_attempt.fetch_add(1, Ordering::Relaxed);

        self.shared
            .registry
            .claim(PairingSession::new_pending(number.clone(), attempt))
            .await?;

        info!(phone_number = %number, attempt, "Starting pairing attempt");

        let (reply_tx, reply_rx) = oneshot::channel();
        let driver = Driver::new(self.shared.clone(), number.clone(), attempt, reply_tx);
        let task = tokio::spawn(driver.run());

        self.shared
            .registry
            .attach_driver(&number, attempt, task.abort_handle())
            .await;

        reply_rx.await.unwrap_or_else(|_| {
            Err(PairingError::Internal(
                "pairing attempt ended without a result".into(),
            ))
        })
    }

    /// Session registry shared with the HTTP layer.
    pub fn registry(&self) -> &SessionRegistry {
        &self.shared.registry
    }

    /// Cleanup timers for this manager's sessions.
    pub fn cleanup(&self) -> &CleanupScheduler {
        &self.shared.cleanup
    }

    pub fn config(&self) -> &PairingConfig {
        &self.shared.config
    }

    /// Check if the transport is reachable.
    pub async fn transport_healthy(&self) -> bool {
        self.shared.transport.health_check().await
    }
}
