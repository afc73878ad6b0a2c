// ── Domain model ──
//
// Canonical types the coordinator publishes. None of these know anything
// about the vendor's JSON shape; `convert` bridges the two.

pub mod snapshot;
pub mod status;

pub use kiln_api::ErrorKind as FailureKind;
pub use kiln_api::KilnInfo;
pub use snapshot::Snapshot;
pub use status::{Lifecycle, PollFailure, PollState, PollStatus};
