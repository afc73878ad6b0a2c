// ── Setup validation ──
//
// What a host runs when the user first enters credentials: log in once,
// list the account's kilns, and report failures using the setup form's
// error keys. A successful validation hands its session to the
// coordinators so the first poll does not log in again.

use thiserror::Error;
use tracing::{debug, warn};

use kiln_api::{Credentials, SessionToken};

use crate::config::CoordinatorConfig;
use crate::coordinator::Coordinator;
use crate::error::CoreError;
use crate::model::{FailureKind, KilnInfo};
use crate::source::TelemetrySource;

/// Setup failure, keyed the way host setup forms report it.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Invalid email or password")]
    InvalidAuth,

    #[error("Cannot connect to the Kiln API: {reason}")]
    CannotConnect { reason: String },

    #[error("Unexpected error: {message}")]
    Unknown { message: String },
}

impl SetupError {
    /// Form error key: `invalid_auth`, `cannot_connect` or `unknown`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::InvalidAuth => "invalid_auth",
            Self::CannotConnect { .. } => "cannot_connect",
            Self::Unknown { .. } => "unknown",
        }
    }
}

impl From<CoreError> for SetupError {
    fn from(err: CoreError) -> Self {
        match err.kind() {
            Some(FailureKind::Auth | FailureKind::AuthExpired) => Self::InvalidAuth,
            Some(FailureKind::Network) => Self::CannotConnect {
                reason: err.to_string(),
            },
            Some(FailureKind::Protocol) | None => Self::Unknown {
                message: err.to_string(),
            },
        }
    }
}

/// Result of a successful validation.
#[derive(Debug, Clone)]
pub struct SetupInfo {
    /// Entry title, `"Kiln Monitor ({email})"`.
    pub title: String,
    /// Uniqueness key for the entry; one entry per account.
    pub unique_id: String,
    pub token: SessionToken,
    pub kilns: Vec<KilnInfo>,
}

/// Check credentials against the vendor and discover the account's kilns.
///
/// An account with no kilns is rejected; there would be nothing to poll.
pub async fn validate<S: TelemetrySource>(
    source: &S,
    credentials: &Credentials,
) -> Result<SetupInfo, SetupError> {
    let email = credentials.email();

    let token = source
        .authenticate(credentials)
        .await
        .map_err(|e| log_setup_failure(CoreError::from(e)))?;
    debug!(email, "setup: credentials accepted");

    let kilns = source
        .list_kilns(&token)
        .await
        .map_err(|e| log_setup_failure(CoreError::from(e)))?;
    if kilns.is_empty() {
        return Err(log_setup_failure(CoreError::NoKilns {
            email: email.to_owned(),
        }));
    }
    debug!(email, kilns = kilns.len(), "setup: kilns discovered");

    Ok(SetupInfo {
        title: format!("Kiln Monitor ({email})"),
        unique_id: email.to_owned(),
        token,
        kilns,
    })
}

fn log_setup_failure(err: CoreError) -> SetupError {
    warn!(error = %err, "setup validation failed");
    SetupError::from(err)
}

/// One coordinator per discovered kiln, all sharing the validated session.
pub fn coordinators_for<S: TelemetrySource + Clone>(
    source: &S,
    credentials: &Credentials,
    config: &CoordinatorConfig,
    info: &SetupInfo,
) -> Vec<Coordinator<S>> {
    info.kilns
        .iter()
        .map(|kiln| {
            Coordinator::builder(source.clone(), credentials.clone())
                .config(config.clone())
                .kiln(kiln.clone())
                .token(info.token.clone())
                .build()
        })
        .collect()
}
