// kiln-api: Async Rust client for the Bartlett Kiln Aid cloud API.
//
// The vendor owns the wire format. This crate is the only place that knows
// its URLs, headers and JSON shapes; everything above it works with
// `SessionToken`, `KilnInfo` and `RawPayload`.

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod transport;

pub use auth::{Credentials, Endpoints, SessionToken};
pub use client::KilnClient;
pub use error::{Error, ErrorKind};
pub use models::{KilnInfo, RawPayload};
pub use transport::TransportConfig;
