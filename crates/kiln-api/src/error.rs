use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Top-level error type for the `kiln-api` crate.
///
/// Covers every failure mode of the three vendor endpoints: login,
/// settings (kiln discovery) and telemetry. `kiln-core` maps these into
/// poll failures and setup diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected (wrong credentials, missing token, unexpected status).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The session token was rejected by an authenticated endpoint.
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    /// A credential could not be encoded as an HTTP header.
    #[error("Invalid header value for {name}")]
    InvalidHeader { name: &'static str },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// Too many requests; the vendor throttles logins aggressively.
    #[error("Rate limited -- too many requests")]
    RateLimited,

    /// The vendor returned a 5xx.
    #[error("Kiln API server error (HTTP {status})")]
    Server { status: u16 },

    // ── Vendor contract ─────────────────────────────────────────────
    /// Any other non-success status.
    #[error("Kiln API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Telemetry endpoint answered 404 for the requested kiln.
    #[error("Kiln not found -- check that the kiln is online")]
    KilnNotFound,

    /// Telemetry endpoint answered with an empty or non-array body.
    #[error("Empty or invalid kiln data response")]
    EmptyPayload,

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

/// Coarse classification of an [`Error`].
///
/// The coordinator uses this to decide between re-authenticating,
/// serving stale data, and flagging a vendor contract change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad credentials. User-actionable.
    Auth,
    /// Token no longer valid. Resolved by one re-authentication.
    AuthExpired,
    /// Connectivity or vendor availability. Transient.
    Network,
    /// The vendor response had an unexpected shape.
    Protocol,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::AuthExpired => "auth_expired",
            Self::Network => "network",
            Self::Protocol => "protocol",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } | Self::InvalidHeader { .. } => ErrorKind::Auth,
            Self::SessionExpired => ErrorKind::AuthExpired,
            Self::Transport(_)
            | Self::InvalidUrl(_)
            | Self::Timeout { .. }
            | Self::ClientBuild(_)
            | Self::RateLimited
            | Self::Server { .. } => ErrorKind::Network,
            Self::Api { .. }
            | Self::KilnNotFound
            | Self::EmptyPayload
            | Self::Deserialization { .. } => ErrorKind::Protocol,
        }
    }

    /// Returns `true` if the session token was rejected and
    /// re-authentication might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}
