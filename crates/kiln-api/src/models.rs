// Wire types for the Kiln Aid API.
//
// Only the login and settings responses are typed. Telemetry is kept as
// raw JSON; translating it into a snapshot is the core's job.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(default)]
    pub authentication_token: Option<String>,
}

/// One entry of the settings endpoint's array. Every field is optional on
/// the wire; entries without a `kiln_id` are unusable.
#[derive(Debug, Deserialize)]
pub(crate) struct KilnSettingsEntry {
    #[serde(default)]
    pub kiln_id: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Identity of a kiln registered to the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilnInfo {
    /// External id used to request telemetry.
    pub kiln_id: String,
    pub serial_number: Option<String>,
    pub name: String,
}

impl KilnInfo {
    pub const DEFAULT_NAME: &'static str = "Kiln";

    /// Stable identifier for sensors: the serial number when known,
    /// otherwise the kiln id.
    pub fn stable_id(&self) -> &str {
        self.serial_number.as_deref().unwrap_or(&self.kiln_id)
    }
}

impl KilnSettingsEntry {
    pub(crate) fn into_info(self) -> Option<KilnInfo> {
        let kiln_id = self.kiln_id.filter(|id| !id.is_empty())?;
        Some(KilnInfo {
            kiln_id,
            serial_number: self.serial_number,
            name: self
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| KilnInfo::DEFAULT_NAME.to_owned()),
        })
    }
}

/// First element of the telemetry endpoint's response, untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(serde_json::Value);

impl RawPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Follow a path of object keys, e.g. `["settings", "numZones"]`.
    pub fn pointer(&self, path: &[&str]) -> Option<&serde_json::Value> {
        path.iter().try_fold(&self.0, |node, key| node.get(key))
    }
}
