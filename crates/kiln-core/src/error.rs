// ── Core error types ──
//
// Domain errors from kiln-core. Consumers never see HTTP status codes or
// JSON parse failures directly; the `From<kiln_api::Error>` impl folds
// them into the four failure kinds the coordinator reasons about.

use thiserror::Error;

use crate::model::FailureKind;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    // ── Connectivity ─────────────────────────────────────────────────
    #[error("Cannot reach the Kiln API: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Kiln API request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Vendor contract ──────────────────────────────────────────────
    #[error("Unexpected response from the Kiln API: {message}")]
    Protocol { message: String },

    #[error("No kilns are registered to account {email}")]
    NoKilns { email: String },

    // ── Coordinator ──────────────────────────────────────────────────
    #[error("A poll is already in flight")]
    PollInFlight,

    #[error("Coordinator is already running")]
    AlreadyRunning,

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Failure classification for errors that can end a poll.
    ///
    /// Returns `None` for coordinator bookkeeping errors (`PollInFlight`,
    /// `AlreadyRunning`, `Config`) which never reach the last-error slot.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::AuthenticationFailed { .. } => Some(FailureKind::Auth),
            Self::SessionExpired => Some(FailureKind::AuthExpired),
            Self::ConnectionFailed { .. } | Self::Timeout { .. } => Some(FailureKind::Network),
            Self::Protocol { .. } | Self::NoKilns { .. } => Some(FailureKind::Protocol),
            Self::PollInFlight | Self::AlreadyRunning | Self::Config { .. } => None,
        }
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<kiln_api::Error> for CoreError {
    fn from(err: kiln_api::Error) -> Self {
        match err {
            kiln_api::Error::Authentication { message } => Self::AuthenticationFailed { message },
            kiln_api::Error::InvalidHeader { name } => Self::AuthenticationFailed {
                message: format!("credential cannot be sent as the {name} header"),
            },
            kiln_api::Error::SessionExpired => Self::SessionExpired,
            kiln_api::Error::Transport(ref e) if e.is_timeout() => Self::ConnectionFailed {
                reason: format!("timed out: {e}"),
            },
            kiln_api::Error::Transport(ref e) => Self::ConnectionFailed {
                reason: e.to_string(),
            },
            kiln_api::Error::Timeout { timeout_secs } => Self::Timeout { timeout_secs },
            kiln_api::Error::RateLimited => Self::ConnectionFailed {
                reason: "rate limited by the Kiln API".into(),
            },
            kiln_api::Error::Server { status } => Self::ConnectionFailed {
                reason: format!("server error (HTTP {status})"),
            },
            kiln_api::Error::InvalidUrl(e) => Self::Config {
                message: format!("Invalid URL: {e}"),
            },
            kiln_api::Error::ClientBuild(message) => Self::Config { message },
            kiln_api::Error::Api { status, message } => Self::Protocol {
                message: format!("HTTP {status}: {message}"),
            },
            kiln_api::Error::KilnNotFound => Self::Protocol {
                message: "kiln not found -- check that the kiln is online".into(),
            },
            kiln_api::Error::EmptyPayload => Self::Protocol {
                message: "empty or invalid kiln data response".into(),
            },
            kiln_api::Error::Deserialization { message, body: _ } => Self::Protocol { message },
        }
    }
}
