//! Deferred session cleanup.
//!
//! One cancellable timer per phone number. When it fires the attempt it was
//! armed for is torn down: registry entries removed, driver aborted, transport
//! closed and on-disk state erased. Every step is keyed by the attempt id, so
//! a timer left over from an earlier attempt is harmless.

use crate::registry::SessionRegistry;
use crate::storage::AuthStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Whether a teardown should abort the attempt's driver task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverAction {
    /// Abort the driver. Used by timers and external callers.
    Abort,
    /// Leave the driver running. Used by the driver tearing itself down.
    Keep,
}

struct ScheduledCleanup {
    attempt: u64,
    task: AbortHandle,
}

/// Cancellable per-number cleanup timers.
#[derive(Clone)]
pub struct CleanupScheduler {
    registry: SessionRegistry,
    store: AuthStore,
    timers: Arc<Mutex<HashMap<String, ScheduledCleanup>>>,
}

impl CleanupScheduler {
    pub fn new(registry: SessionRegistry, store: AuthStore) -> Self {
        Self {
            registry,
            store,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Arm a cleanup for `attempt` after `delay`, replacing any existing timer
    /// for the number.
    pub async fn schedule(&self, phone_number: &str, attempt: u64, delay: Duration) {
        let this = self.clone();
        let number = phone_number.to_string();

        // Held until the entry is in place so a short timer cannot fire first.
        let mut timers = self.timers.lock().await;

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.fire(&number, attempt).await;
        });

        let previous = timers.insert(
            phone_number.to_string(),
            ScheduledCleanup {
                attempt,
                task: task.abort_handle(),
            },
        );

        if let Some(previous) = previous {
            previous.task.abort();
        }

        debug!(phone_number = %phone_number, attempt, ?delay, "Cleanup scheduled");
    }

    /// Disarm the timer for a number, if any.
    pub async fn cancel(&self, phone_number: &str) -> bool {
        match self.timers.lock().await.remove(phone_number) {
            Some(timer) => {
                timer.task.abort();
                debug!(phone_number = %phone_number, attempt = timer.attempt, "Cleanup cancelled");
                true
            }
            None => false,
        }
    }

    /// Check if a timer is armed for a number.
    pub async fn is_scheduled(&self, phone_number: &str) -> bool {
        self.timers.lock().await.contains_key(phone_number)
    }

    /// Tear an attempt down now. Returns false if the attempt no longer owns
    /// the registry entry.
    pub async fn teardown(&self, phone_number: &str, attempt: u64, action: DriverAction) -> bool {
        {
            let mut timers = self.timers.lock().await;
            if timers.get(phone_number).map(|t| t.attempt) == Some(attempt) {
                if let Some(timer) = timers.remove(phone_number) {
                    timer.task.abort();
                }
            }
        }

        self.remove_attempt(phone_number, attempt, action).await
    }

    async fn fire(&self, phone_number: &str, attempt: u64) {
        {
            let mut timers = self.timers.lock().await;
            if timers.get(phone_number).map(|t| t.attempt) == Some(attempt) {
                timers.remove(phone_number);
            }
        }

        if self
            .remove_attempt(phone_number, attempt, DriverAction::Abort)
            .await
        {
            info!(phone_number = %phone_number, attempt, "Session cleaned up");
        }
    }

    async fn remove_attempt(&self, phone_number: &str, attempt: u64, action: DriverAction) -> bool {
        let Some(removed) = self.registry.remove(phone_number, attempt).await else {
            debug!(phone_number = %phone_number, attempt, "Cleanup skipped, attempt superseded");
            return false;
        };

        if let Some(handle) = removed.handle {
            if action == DriverAction::Abort {
                if let Some(driver) = handle.driver {
                    driver.abort();
                }
            }
            if let Some(transport) = handle.transport {
                transport.close().await;
            }
        }

        if let Err(e) = self.store.erase(phone_number).await {
            warn!(phone_number = %phone_number, "Failed to erase session storage: {}", e);
        }

        true
    }
}
