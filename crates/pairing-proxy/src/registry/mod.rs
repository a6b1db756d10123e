//! Pairing session registry.

mod memory;

pub use memory::{LiveHandle, RemovedSession, SessionRegistry};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Externally visible status of a pairing session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Code issued or connection in progress
    Pending,
    /// Credential harvested and delivered
    Completed,
    /// Attempt ended without a credential
    Failed,
}

/// Lifecycle state of a pairing attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PairingState {
    Starting,
    CodeIssued,
    AwaitingConfirmation,
    Reconnecting,
    Harvesting,
    Completed,
    Terminal,
}

impl PairingState {
    /// `Completed` and `Terminal` are absorbing.
    pub fn is_final(self) -> bool {
        matches!(self, PairingState::Completed | PairingState::Terminal)
    }

    pub fn status(self) -> SessionStatus {
        match self {
            PairingState::Completed => SessionStatus::Completed,
            PairingState::Terminal => SessionStatus::Failed,
            _ => SessionStatus::Pending,
        }
    }
}

/// Snapshot of one pairing attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingSession {
    /// Digits only, no leading `+`
    pub phone_number: String,

    pub status: SessionStatus,

    pub state: PairingState,

    /// Grouped pairing code (`XXXX-XXXX`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_code: Option<String>,

    /// Encoded credential, set once on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_blob: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub retry_count: u32,

    /// Attempt that owns this entry
    #[serde(skip)]
    pub attempt: u64,
}

impl PairingSession {
    /// Create a fresh pending session.
    pub fn new_pending(phone_number: String, attempt: u64) -> Self {
        let now = Utc::now();
        Self {
            phone_number,
            status: SessionStatus::Pending,
            state: PairingState::Starting,
            pairing_code: None,
            credential_blob: None,
            created_at: now,
            updated_at: now,
            retry_count: 0,
            attempt,
        }
    }

    /// Move to `state`. Returns false if the session already reached a final state.
    pub fn set_state(&mut self, state: PairingState) -> bool {
        if self.state.is_final() {
            return false;
        }
        self.state = state;
        self.status = state.status();
        true
    }

    /// Record the harvested credential. Only the first call has any effect.
    pub fn complete(&mut self, credential_blob: String) -> bool {
        if self.state.is_final() || self.credential_blob.is_some() {
            return false;
        }
        self.credential_blob = Some(credential_blob);
        self.set_state(PairingState::Completed)
    }

    /// Mark the attempt as failed.
    pub fn fail(&mut self) -> bool {
        self.set_state(PairingState::Terminal)
    }
}

/// Normalize a phone number to bare digits.
///
/// Accepts an optional leading `+` and common separators; the result must be
/// 10 to 15 digits.
pub fn normalize_phone_number(number: &str) -> Result<String, String> {
    let trimmed = number.trim();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);

    let digits: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    if digits.is_empty() {
        return Err("Phone number must contain at least one digit".into());
    }

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("Phone number must contain digits only".into());
    }

    if digits.len() < 10 {
        return Err("Phone number too short".into());
    }

    if digits.len() > 15 {
        return Err("Phone number too long".into());
    }

    Ok(digits)
}

/// Group a raw pairing code into blocks of four (`ABCD-EFGH`).
pub fn format_pairing_code(raw: &str) -> String {
    let chars: Vec<char> = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    chars
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}
