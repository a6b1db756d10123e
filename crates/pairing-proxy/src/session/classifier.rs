//! Disconnect classification.
//!
//! Maps a transport-reported disconnect reason to what the lifecycle should
//! do next. Pure lookup, total over every input.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Why a transport session closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    LoggedOut,
    Forbidden,
    ConnectionLost,
    MultideviceMismatch,
    PreconditionRequired,
    ConnectionReplaced,
    InternalError,
    ServiceUnavailable,
    RestartRequired,
    Unknown(u16),
}

impl DisconnectReason {
    /// Map a numeric status code reported by the transport.
    pub fn from_code(code: u16) -> Self {
        match code {
            401 => Self::LoggedOut,
            403 => Self::Forbidden,
            408 => Self::ConnectionLost,
            411 => Self::MultideviceMismatch,
            428 => Self::PreconditionRequired,
            440 => Self::ConnectionReplaced,
            500 => Self::InternalError,
            503 => Self::ServiceUnavailable,
            515 => Self::RestartRequired,
            other => Self::Unknown(other),
        }
    }

    /// Like [`from_code`](Self::from_code), for transports that may omit the code.
    pub fn from_status(code: Option<u16>) -> Self {
        code.map(Self::from_code).unwrap_or(Self::Unknown(0))
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedOut => write!(f, "logged_out"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::ConnectionLost => write!(f, "connection_lost"),
            Self::MultideviceMismatch => write!(f, "multidevice_mismatch"),
            Self::PreconditionRequired => write!(f, "precondition_required"),
            Self::ConnectionReplaced => write!(f, "connection_replaced"),
            Self::InternalError => write!(f, "internal_error"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
            Self::RestartRequired => write!(f, "restart_required"),
            Self::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}

/// What to do after a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Credentials are invalid; erase everything.
    TerminalFatal,
    /// The number is blocked; erase everything.
    TerminalForbidden,
    /// Reconnect after the given delay.
    Retryable(Duration),
}

/// Reconnect delays per disconnect reason.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackoffTable {
    #[serde(default = "default_connection_lost", with = "humantime_serde")]
    pub connection_lost: Duration,

    #[serde(default = "default_restart_required", with = "humantime_serde")]
    pub restart_required: Duration,

    #[serde(default = "default_internal_error", with = "humantime_serde")]
    pub internal_error: Duration,

    #[serde(default = "default_service_unavailable", with = "humantime_serde")]
    pub service_unavailable: Duration,

    #[serde(default = "default_multidevice_mismatch", with = "humantime_serde")]
    pub multidevice_mismatch: Duration,

    #[serde(default = "default_precondition_required", with = "humantime_serde")]
    pub precondition_required: Duration,

    /// Used for every reason without its own entry.
    #[serde(default = "default_unknown", with = "humantime_serde")]
    pub unknown: Duration,
}

impl Default for BackoffTable {
    fn default() -> Self {
        Self {
            connection_lost: default_connection_lost(),
            restart_required: default_restart_required(),
            internal_error: default_internal_error(),
            service_unavailable: default_service_unavailable(),
            multidevice_mismatch: default_multidevice_mismatch(),
            precondition_required: default_precondition_required(),
            unknown: default_unknown(),
        }
    }
}

impl BackoffTable {
    /// The same delay for every retryable reason.
    pub fn uniform(delay: Duration) -> Self {
        Self {
            connection_lost: delay,
            restart_required: delay,
            internal_error: delay,
            service_unavailable: delay,
            multidevice_mismatch: delay,
            precondition_required: delay,
            unknown: delay,
        }
    }

    /// Classify a disconnect reason.
    pub fn classify(&self, reason: DisconnectReason) -> Disposition {
        use DisconnectReason::*;

        let delay = match reason {
            LoggedOut => return Disposition::TerminalFatal,
            Forbidden => return Disposition::TerminalForbidden,
            ConnectionLost => self.connection_lost,
            RestartRequired => self.restart_required,
            InternalError => self.internal_error,
            ServiceUnavailable => self.service_unavailable,
            MultideviceMismatch => self.multidevice_mismatch,
            PreconditionRequired => self.precondition_required,
            ConnectionReplaced | Unknown(_) => self.unknown,
        };

        Disposition::Retryable(delay)
    }

    /// Longest retryable delay in the table.
    pub fn max_delay(&self) -> Duration {
        [
            self.connection_lost,
            self.restart_required,
            self.internal_error,
            self.service_unavailable,
            self.multidevice_mismatch,
            self.precondition_required,
            self.unknown,
        ]
        .into_iter()
        .max()
        .unwrap_or_default()
    }
}

/// Classify with the default delay table.
pub fn classify(reason: DisconnectReason) -> Disposition {
    BackoffTable::default().classify(reason)
}

fn default_connection_lost() -> Duration {
    Duration::from_secs(5)
}

fn default_restart_required() -> Duration {
    Duration::from_secs(2)
}

fn default_internal_error() -> Duration {
    Duration::from_secs(5)
}

fn default_service_unavailable() -> Duration {
    Duration::from_secs(60)
}

fn default_multidevice_mismatch() -> Duration {
    Duration::from_secs(2)
}

fn default_precondition_required() -> Duration {
    Duration::from_secs(10)
}

fn default_unknown() -> Duration {
    Duration::from_secs(5)
}
