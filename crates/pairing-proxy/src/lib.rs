//! Pairing Proxy - pairing-code linking service.
//!
//! Pairs a phone number with a messaging account through a one-time pairing
//! code:
//! - Issues the code and keeps the transport alive until the device confirms
//! - Retries classified disconnects with bounded backoff
//! - Harvests the resulting credential and delivers it to the account
//! - Discards all per-number state once the attempt ends

pub mod api;
pub mod config;
pub mod error;
pub mod registry;
pub mod session;
pub mod storage;
pub mod transport;

pub use config::Config;
pub use error::{PairingError, ProxyError};
pub use registry::{PairingSession, SessionRegistry, SessionStatus};
pub use session::SessionManager;
pub use storage::AuthStore;
