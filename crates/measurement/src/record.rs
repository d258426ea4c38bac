//! Raw and Clean Measurement Records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Measurement value as delivered by an upstream API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// Numeric JSON value
    Number(f64),
    /// Textual value that still needs coercion
    Text(String),
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

/// Timestamp as delivered by an upstream API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// Already-parsed UTC datetime
    Parsed(DateTime<Utc>),
    /// ISO-8601 text, optionally with a `Z` suffix
    Text(String),
}

impl From<DateTime<Utc>> for RawTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        RawTimestamp::Parsed(value)
    }
}

impl From<&str> for RawTimestamp {
    fn from(value: &str) -> Self {
        RawTimestamp::Text(value.to_string())
    }
}

/// Untrusted measurement produced by an ingestion source.
///
/// Every field is optional; the cleaner decides what survives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMeasurement {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub parameter: Option<String>,
    #[serde(default)]
    pub value: Option<RawValue>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub date_utc: Option<RawTimestamp>,
    #[serde(default)]
    pub source: Option<String>,
}

impl RawMeasurement {
    /// Build a fully populated raw record
    pub fn new(
        city: &str,
        parameter: &str,
        value: impl Into<RawValue>,
        unit: &str,
        date_utc: impl Into<RawTimestamp>,
        source: &str,
    ) -> Self {
        Self {
            city: Some(city.to_string()),
            parameter: Some(parameter.to_string()),
            value: Some(value.into()),
            unit: Some(unit.to_string()),
            date_utc: Some(date_utc.into()),
            source: Some(source.to_string()),
        }
    }
}

/// Validated measurement in the canonical unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub city: String,
    /// Canonical parameter name (unknown names are upper-cased)
    pub parameter: String,
    pub value: f64,
    pub unit: String,
    pub date_utc: DateTime<Utc>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_outlier: Option<bool>,
    /// Untouched upstream payload kept for audit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<RawMeasurement>,
}

/// Identity of one observation: city, parameter, timestamp, and source
pub type ObservationKey = (String, String, DateTime<Utc>, String);

impl Measurement {
    /// Key shared by every record of the same observation
    pub fn observation_key(&self) -> ObservationKey {
        (
            self.city.clone(),
            self.parameter.clone(),
            self.date_utc,
            self.source.clone(),
        )
    }
}
