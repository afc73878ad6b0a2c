// ── Poll status ──
//
// What readers get from `Coordinator::current()`: the last good snapshot
// plus enough freshness information to tell whether it is stale.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display};

use super::{FailureKind, Snapshot};
use crate::error::CoreError;

/// Freshness of the published snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    /// No poll has completed yet.
    Uninitialized,
    /// The most recent poll succeeded.
    Fresh,
    /// The most recent poll failed; the previous snapshot is still served.
    Stale,
    /// The most recent poll failed and there is no snapshot to fall back on.
    Unavailable,
}

/// Whether the periodic cycle is running. Observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

/// Why the most recent poll failed, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollFailure {
    pub kind: FailureKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl PollFailure {
    pub(crate) fn from_error(err: &CoreError, at: DateTime<Utc>) -> Self {
        Self {
            kind: err.kind().unwrap_or(FailureKind::Network),
            message: err.to_string(),
            at,
        }
    }
}

/// Point-in-time view of the coordinator's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollStatus {
    pub state: PollState,
    /// Last known good snapshot. `None` until a poll succeeds.
    pub snapshot: Option<Arc<Snapshot>>,
    /// Set when the most recent poll failed; cleared by the next success.
    pub last_error: Option<PollFailure>,
    pub consecutive_failures: u32,
    pub last_attempt: Option<DateTime<Utc>>,
}

impl Default for PollStatus {
    fn default() -> Self {
        Self::uninitialized()
    }
}

impl PollStatus {
    pub fn uninitialized() -> Self {
        Self {
            state: PollState::Uninitialized,
            snapshot: None,
            last_error: None,
            consecutive_failures: 0,
            last_attempt: None,
        }
    }

    /// A snapshot exists (fresh or stale).
    pub fn is_available(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn is_stale(&self) -> bool {
        self.state == PollState::Stale
    }

    pub fn last_poll_failed(&self) -> bool {
        self.last_error.is_some()
    }

    /// Age of the snapshot relative to now.
    pub fn age(&self) -> Option<Duration> {
        self.age_at(Utc::now())
    }

    /// Age of the snapshot relative to `now`. Clock skew clamps to zero.
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.snapshot
            .as_ref()
            .map(|s| (now - s.fetched_at).to_std().unwrap_or_default())
    }

    /// Successor after a successful poll. Polls are serialized, so the new
    /// snapshot always replaces the held one regardless of wall-clock time.
    pub(crate) fn succeeded(&self, snapshot: Arc<Snapshot>, attempted_at: DateTime<Utc>) -> Self {
        Self {
            state: PollState::Fresh,
            snapshot: Some(snapshot),
            last_error: None,
            consecutive_failures: 0,
            last_attempt: Some(attempted_at),
        }
    }

    /// Successor after a failed poll. The snapshot is carried over as-is.
    pub(crate) fn failed(&self, failure: PollFailure) -> Self {
        let state = if self.snapshot.is_some() {
            PollState::Stale
        } else {
            PollState::Unavailable
        };
        Self {
            state,
            snapshot: self.snapshot.clone(),
            last_attempt: Some(failure.at),
            last_error: Some(failure),
            consecutive_failures: self.consecutive_failures.saturating_add(1),
        }
    }
}
