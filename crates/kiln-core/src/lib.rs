//! Polling coordinator between `kiln-api` and host integrations.
//!
//! This crate owns the domain model, the poll scheduler and the sensor
//! adapters for a kiln telemetry integration:
//!
//! - **[`Coordinator`]** — Central facade for one kiln. [`start()`](Coordinator::start)
//!   spawns a single background task that polls on a fixed interval;
//!   [`poll_once()`](Coordinator::poll_once) runs one poll on demand.
//!   Expired sessions are re-authenticated once per poll, and failed polls
//!   keep the last good [`Snapshot`] published as stale.
//!
//! - **[`PollStatus`]** — What readers see: the snapshot, its
//!   [`PollState`], and the last failure. Read lock-free via
//!   [`Coordinator::current()`] or followed via [`StatusStream`].
//!
//! - **[`TelemetrySource`]** — The three vendor operations the coordinator
//!   depends on. Implemented for [`kiln_api::KilnClient`].
//!
//! - **Sensors** ([`sensor`]) — One [`KilnSensor`] per reading, talking to
//!   the coordinator only through [`DataProvider`].
//!
//! - **Setup** ([`setup`]) — Credential validation and kiln discovery for a
//!   host's setup flow.

pub mod config;
pub mod convert;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod sensor;
pub mod setup;
pub mod source;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, CoordinatorBuilder, MAX_INTERVAL};
pub use error::CoreError;
pub use sensor::{DataProvider, DeviceInfo, KilnSensor, SensorKind, SensorValue, sensors_for};
pub use setup::{SetupError, SetupInfo};
pub use source::TelemetrySource;
pub use stream::StatusStream;

pub use model::{FailureKind, KilnInfo, Lifecycle, PollFailure, PollState, PollStatus, Snapshot};
