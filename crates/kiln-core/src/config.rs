// ── Runtime coordinator configuration ──
//
// How often to poll and how close together two polls may start. Built by
// the host (or kiln-config) and handed in; core never reads config files.

use std::time::Duration;

/// Default refresh interval: five minutes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default minimum spacing between the end of one poll and the start of
/// the next.
pub const DEFAULT_MIN_SPACING: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Fixed spacing between scheduled polls.
    pub interval: Duration,
    /// A tick arriving sooner than this after the previous poll finished
    /// is skipped.
    pub min_spacing: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            min_spacing: DEFAULT_MIN_SPACING,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_min_spacing(mut self, min_spacing: Duration) -> Self {
        self.min_spacing = min_spacing;
        self
    }
}
