//! In-memory session registry.

use super::PairingSession;
use crate::error::PairingError;
use crate::transport::TransportSession;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;

/// Live resources of an in-flight attempt.
pub struct LiveHandle {
    pub attempt: u64,
    /// Task driving the attempt
    pub driver: Option<AbortHandle>,
    /// Open transport session, if connected
    pub transport: Option<Arc<dyn TransportSession>>,
}

/// Entries removed by [`SessionRegistry::remove`].
pub struct RemovedSession {
    pub session: PairingSession,
    pub handle: Option<LiveHandle>,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<String, PairingSession>,
    handles: HashMap<String, LiveHandle>,
}

/// Concurrent map of phone number to session snapshot and live handle.
///
/// Readers always get a whole snapshot. Every mutation after
/// [`claim`](Self::claim) is keyed by the attempt id, so a superseded driver
/// or timer can never touch a newer attempt's entry.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl SessionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session unless the number already has one.
    pub async fn claim(&self, session: PairingSession) -> Result<(), PairingError> {
        let mut inner = self.inner.write().await;
        let number = session.phone_number.clone();

        if inner.sessions.contains_key(&number) || inner.handles.contains_key(&number) {
            return Err(PairingError::SessionActive(number));
        }

        inner.handles.insert(
            number.clone(),
            LiveHandle {
                attempt: session.attempt,
                driver: None,
                transport: None,
            },
        );
        inner.sessions.insert(number, session);
        Ok(())
    }

    /// Snapshot of a session.
    pub async fn get(&self, phone_number: &str) -> Option<PairingSession> {
        self.inner.read().await.sessions.get(phone_number).cloned()
    }

    /// Check if a session is recorded for a number.
    pub async fn contains(&self, phone_number: &str) -> bool {
        self.inner.read().await.sessions.contains_key(phone_number)
    }

    /// Check if an attempt for a number still holds live resources.
    pub async fn is_live(&self, phone_number: &str) -> bool {
        self.inner.read().await.handles.contains_key(phone_number)
    }

    /// Mutate a session owned by `attempt`. Returns the updated snapshot.
    pub async fn update<F>(&self, phone_number: &str, attempt: u64, f: F) -> Option<PairingSession>
    where
        F: FnOnce(&mut PairingSession),
    {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(phone_number)
            .filter(|s| s.attempt == attempt)?;

        f(session);
        session.updated_at = Utc::now();
        Some(session.clone())
    }

    /// Record the task driving an attempt.
    pub async fn attach_driver(&self, phone_number: &str, attempt: u64, driver: AbortHandle) -> bool {
        let mut inner = self.inner.write().await;
        match inner.handles.get_mut(phone_number) {
            Some(handle) if handle.attempt == attempt => {
                handle.driver = Some(driver);
                true
            }
            _ => false,
        }
    }

    /// Record the open transport session of an attempt.
    pub async fn attach_transport(
        &self,
        phone_number: &str,
        attempt: u64,
        transport: Arc<dyn TransportSession>,
    ) -> bool {
        let mut inner = self.inner.write().await;
        match inner.handles.get_mut(phone_number) {
            Some(handle) if handle.attempt == attempt => {
                handle.transport = Some(transport);
                true
            }
            _ => false,
        }
    }

    /// Detach the transport session of an attempt.
    pub async fn release_transport(
        &self,
        phone_number: &str,
        attempt: u64,
    ) -> Option<Arc<dyn TransportSession>> {
        let mut inner = self.inner.write().await;
        inner
            .handles
            .get_mut(phone_number)
            .filter(|h| h.attempt == attempt)
            .and_then(|h| h.transport.take())
    }

    /// Drop the live handle of an attempt, keeping its session snapshot.
    pub async fn release_handle(&self, phone_number: &str, attempt: u64) -> Option<LiveHandle> {
        let mut inner = self.inner.write().await;
        if inner.handles.get(phone_number)?.attempt != attempt {
            return None;
        }
        inner.handles.remove(phone_number)
    }

    /// Remove both entries of an attempt.
    pub async fn remove(&self, phone_number: &str, attempt: u64) -> Option<RemovedSession> {
        let mut inner = self.inner.write().await;
        if inner.sessions.get(phone_number)?.attempt != attempt {
            return None;
        }

        let session = inner.sessions.remove(phone_number)?;
        let handle = match inner.handles.get(phone_number) {
            Some(h) if h.attempt == attempt => inner.handles.remove(phone_number),
            _ => None,
        };

        Some(RemovedSession { session, handle })
    }

    /// Number of recorded sessions.
    pub async fn count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Number of attempts holding live resources.
    pub async fn live_count(&self) -> usize {
        self.inner.read().await.handles.len()
    }
}
