// ── Payload-to-snapshot conversion ──
//
// The vendor sends numbers either as JSON numbers or as numeric strings,
// and has been seen to flip between the two across firmware versions.
// Every reading is required; a missing or unparseable field fails the
// whole poll as a protocol error rather than publishing a partial
// snapshot.

use chrono::{DateTime, Utc};
use serde_json::Value;

use kiln_api::RawPayload;

use crate::error::CoreError;
use crate::model::Snapshot;
use crate::sensor::SensorKind;

// ── Helpers ────────────────────────────────────────────────────────

fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Non-negative whole number that fits in a `u32`. `3`, `3.0` and `"3"`
/// all qualify; `3.5` and `-1` do not.
fn count(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    if let Some(n) = value.as_str().and_then(|s| s.trim().parse::<u32>().ok()) {
        return Some(n);
    }
    whole_f64_to_u32(number(value)?)
}

#[allow(
    clippy::float_cmp,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::as_conversions
)]
fn whole_f64_to_u32(n: f64) -> Option<u32> {
    (n.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&n)).then_some(n as u32)
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn field<'a>(raw: &'a RawPayload, kind: SensorKind) -> Result<&'a Value, CoreError> {
    let path = kind.description().data_path;
    raw.pointer(&path)
        .filter(|v| !v.is_null())
        .ok_or_else(|| CoreError::Protocol {
            message: format!("missing field {}", path.join(".")),
        })
}

fn read<T>(
    raw: &RawPayload,
    kind: SensorKind,
    parse: impl FnOnce(&Value) -> Option<T>,
) -> Result<T, CoreError> {
    let value = field(raw, kind)?;
    parse(value).ok_or_else(|| CoreError::Protocol {
        message: format!(
            "field {} has unexpected value {value}",
            kind.description().data_path.join(".")
        ),
    })
}

// ── Snapshot ───────────────────────────────────────────────────────

impl Snapshot {
    /// Build a snapshot from one telemetry payload.
    pub fn from_payload(raw: &RawPayload, fetched_at: DateTime<Utc>) -> Result<Self, CoreError> {
        Ok(Self {
            temperature: read(raw, SensorKind::Temperature, number)?,
            status: read(raw, SensorKind::Status, text)?,
            firmware_version: read(raw, SensorKind::FirmwareVersion, text)?,
            firing_count: read(raw, SensorKind::FiringCount, count)?,
            zone_count: read(raw, SensorKind::ZoneCount, count)?,
            fetched_at,
        })
    }
}
