use chrono::{DateTime, Utc};
use serde::Serialize;

/// All kiln readings captured by one successful poll.
///
/// Published behind an `Arc` and never mutated; the next successful poll
/// produces a new one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Degrees Fahrenheit.
    pub temperature: f64,
    pub status: String,
    pub firmware_version: String,
    pub firing_count: u32,
    pub zone_count: u32,
    pub fetched_at: DateTime<Utc>,
}
