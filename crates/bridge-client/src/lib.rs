//! Transport bridge REST API client.
//!
//! The messaging engine runs behind a small REST bridge. This crate opens
//! sessions on it, requests pairing codes, sends messages and polls the
//! ordered event feed of each session.

mod client;
mod error;
mod receiver;
mod types;

pub use client::BridgeClient;
pub use error::BridgeError;
pub use receiver::EventReceiver;
pub use types::*;
