// ── Sensor adapters ──
//
// The host-facing side of the coordinator. Each sensor renders one field
// of the current snapshot and only ever talks to a `DataProvider`, so it
// sees the latest published status on every read.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::model::{KilnInfo, PollStatus, Snapshot};

pub const MANUFACTURER: &str = "Bartinst";
pub const MODEL: &str = "Kiln";

/// Narrow read-only interface between the coordinator and host adapters.
///
/// Implementations must answer from memory; `current()` is called on the
/// host's render path and must never wait on the network.
pub trait DataProvider: Send + Sync {
    fn current(&self) -> Arc<PollStatus>;

    /// Identity of the kiln the readings belong to, once known.
    fn kiln(&self) -> Option<Arc<KilnInfo>>;
}

// ── Descriptions ─────────────────────────────────────────────────────

/// One reading exposed per kiln. The string form is the vendor's field
/// name, which also forms the sensor's unique-id suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, EnumIter)]
pub enum SensorKind {
    #[strum(serialize = "temperature")]
    Temperature,
    #[strum(serialize = "kilnStatus")]
    Status,
    #[strum(serialize = "firmwareVersion")]
    FirmwareVersion,
    #[strum(serialize = "numFirings")]
    FiringCount,
    #[strum(serialize = "numZones")]
    ZoneCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Temperature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
    Total,
}

/// Static metadata the host needs to register a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorDescription {
    pub kind: SensorKind,
    pub name: &'static str,
    pub unit: Option<&'static str>,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    /// Location of the value inside the vendor payload.
    pub data_path: [&'static str; 2],
}

impl SensorKind {
    pub fn description(self) -> SensorDescription {
        match self {
            Self::Temperature => SensorDescription {
                kind: self,
                name: "Temperature",
                unit: Some("°F"),
                device_class: Some(DeviceClass::Temperature),
                state_class: Some(StateClass::Measurement),
                data_path: ["list", "temperature"],
            },
            Self::Status => SensorDescription {
                kind: self,
                name: "Status",
                unit: None,
                device_class: None,
                state_class: None,
                data_path: ["list", "kilnStatus"],
            },
            Self::FirmwareVersion => SensorDescription {
                kind: self,
                name: "Firmware Version",
                unit: None,
                device_class: None,
                state_class: None,
                data_path: ["settings", "firmwareVersion"],
            },
            Self::FiringCount => SensorDescription {
                kind: self,
                name: "Number of Firings",
                unit: Some("firings"),
                device_class: None,
                state_class: Some(StateClass::Total),
                data_path: ["settings", "numFirings"],
            },
            Self::ZoneCount => SensorDescription {
                kind: self,
                name: "Zone Count",
                unit: Some("zones"),
                device_class: None,
                state_class: Some(StateClass::Total),
                data_path: ["settings", "numZones"],
            },
        }
    }
}

// ── Values ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorValue {
    Float(f64),
    Count(u32),
    Text(String),
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Count(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl Snapshot {
    /// The reading a given sensor renders.
    pub fn value(&self, kind: SensorKind) -> SensorValue {
        match kind {
            SensorKind::Temperature => SensorValue::Float(self.temperature),
            SensorKind::Status => SensorValue::Text(self.status.clone()),
            SensorKind::FirmwareVersion => SensorValue::Text(self.firmware_version.clone()),
            SensorKind::FiringCount => SensorValue::Count(self.firing_count),
            SensorKind::ZoneCount => SensorValue::Count(self.zone_count),
        }
    }
}

// ── Device ───────────────────────────────────────────────────────────

/// Device-registry entry grouping a kiln's sensors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifier: String,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub sw_version: Option<String>,
    pub serial_number: Option<String>,
}

// ── Adapter ──────────────────────────────────────────────────────────

/// A single sensor bound to a data provider.
#[derive(Clone)]
pub struct KilnSensor {
    provider: Arc<dyn DataProvider>,
    description: SensorDescription,
}

impl fmt::Debug for KilnSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KilnSensor")
            .field("kind", &self.description.kind)
            .finish_non_exhaustive()
    }
}

impl KilnSensor {
    pub fn new(provider: Arc<dyn DataProvider>, kind: SensorKind) -> Self {
        Self {
            provider,
            description: kind.description(),
        }
    }

    pub fn description(&self) -> &SensorDescription {
        &self.description
    }

    /// `"{kiln name} {sensor name}"`, e.g. `"Studio Kiln Temperature"`.
    pub fn name(&self) -> String {
        let kiln = self.provider.kiln();
        let kiln_name = kiln.as_deref().map_or(KilnInfo::DEFAULT_NAME, |k| k.name.as_str());
        format!("{kiln_name} {}", self.description.name)
    }

    /// `"{serial}_{key}"`; stable across restarts.
    pub fn unique_id(&self) -> String {
        let kiln = self.provider.kiln();
        let stable = kiln.as_deref().map_or("kiln", KilnInfo::stable_id);
        format!("{stable}_{}", self.description.kind)
    }

    /// Current reading, or `None` before the first successful poll.
    ///
    /// After a failed poll this still returns the last good value; check
    /// [`is_stale`](Self::is_stale) to tell the two apart.
    pub fn native_value(&self) -> Option<SensorValue> {
        self.provider
            .current()
            .snapshot
            .as_ref()
            .map(|s| s.value(self.description.kind))
    }

    pub fn available(&self) -> bool {
        self.provider.current().is_available()
    }

    pub fn is_stale(&self) -> bool {
        self.provider.current().is_stale()
    }

    pub fn device_info(&self) -> DeviceInfo {
        let kiln = self.provider.kiln();
        let status = self.provider.current();
        DeviceInfo {
            identifier: kiln
                .as_deref()
                .map_or_else(|| "kiln".to_owned(), |k| k.stable_id().to_owned()),
            name: kiln
                .as_deref()
                .map_or_else(|| KilnInfo::DEFAULT_NAME.to_owned(), |k| k.name.clone()),
            manufacturer: MANUFACTURER,
            model: MODEL,
            sw_version: status.snapshot.as_ref().map(|s| s.firmware_version.clone()),
            serial_number: kiln.as_deref().and_then(|k| k.serial_number.clone()),
        }
    }
}

/// One sensor per [`SensorKind`], all reading from `provider`.
pub fn sensors_for(provider: &Arc<dyn DataProvider>) -> Vec<KilnSensor> {
    SensorKind::iter()
        .map(|kind| KilnSensor::new(Arc::clone(provider), kind))
        .collect()
}
