//! Session-level types: raw records in, validated sessions and power samples out.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Every key a raw record may carry. Anything else is rejected at ingestion.
pub const KNOWN_FIELDS: &[&str] = &[
    "userId",
    "connectTime",
    "startChargeTime",
    "lastUpdate",
    "deadline",
    "cumEnergyDelivered_Wh",
    "durationHours",
    "choice",
    "vehicleModel",
    "stationId",
];

/// One record exactly as the record source delivered it.
///
/// Values are kept as strings; casting happens once in the normalizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    fields: BTreeMap<String, String>,
    /// Set when the source could not map the row onto its header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    defect: Option<String>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Returns the trimmed value for `key`, treating empty strings as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Marks the record as structurally broken. The normalizer drops it as malformed.
    pub fn with_defect(mut self, reason: impl Into<String>) -> Self {
        self.defect = Some(reason.into());
        self
    }

    pub fn defect(&self) -> Option<&str> {
        self.defect.as_deref()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            defect: None,
        }
    }
}

/// How the driver booked the charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChargeChoice {
    /// Plug in and charge immediately.
    Regular,
    /// Charge against a requested deadline.
    Scheduled,
}

impl ChargeChoice {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "REGULAR" => Some(Self::Regular),
            "SCHEDULED" => Some(Self::Scheduled),
            _ => None,
        }
    }
}

impl fmt::Display for ChargeChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular => write!(f, "REGULAR"),
            Self::Scheduled => write!(f, "SCHEDULED"),
        }
    }
}

/// A validated charging session. Never mutated after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub connect_time: NaiveDateTime,
    pub start_charge_time: NaiveDateTime,
    pub finish_charge_time: NaiveDateTime,
    /// Only scheduled sessions carry a deadline.
    pub deadline: Option<NaiveDateTime>,
    #[serde(rename = "cumEnergyDelivered_Wh")]
    pub cum_energy_delivered_wh: f64,
    pub duration_hours: f64,
    /// `round(cum_energy_delivered_wh / duration_hours)`, held constant over the session.
    #[serde(rename = "truePeakPower_W")]
    pub true_peak_power_w: f64,
    /// Time connected past the deadline, in hours (0 without a deadline).
    pub overstay_hours: f64,
    pub choice: ChargeChoice,
    pub vehicle_model: String,
    pub station_id: String,
}

/// One exploded sample: a session's constant rate at one grid boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSample {
    pub timestamp: NaiveDateTime,
    /// Watts.
    pub power_w: f64,
}
