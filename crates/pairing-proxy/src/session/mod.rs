//! Pairing session lifecycle.
//!
//! [`SessionManager::start`] claims the number in the registry and spawns a
//! driver task that owns the attempt from first connect to teardown.
//! Disconnects go through the [`classifier`]; deferred removal goes through the
//! [`CleanupScheduler`].

pub mod classifier;
mod cleanup;
mod driver;
mod manager;

pub use classifier::{classify, BackoffTable, DisconnectReason, Disposition};
pub use cleanup::{CleanupScheduler, DriverAction};
pub use manager::SessionManager;
