//! Upstream Sources

use crate::IngestionError;
use chrono::{DateTime, Duration, Utc};
use data_validator::{parse_timestamp, RejectReason};
use measurement::{Parameter, RawMeasurement};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

/// Upstream data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    OpenAq,
    AirNow,
    Tempo,
    Pandora,
    Tolnet,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::OpenAq => "openaq",
            SourceKind::AirNow => "airnow",
            SourceKind::Tempo => "tempo",
            SourceKind::Pandora => "pandora",
            SourceKind::Tolnet => "tolnet",
        }
    }

    /// Records from this source may overlap earlier fetches
    pub fn refetches_overlap(&self) -> bool {
        matches!(self, SourceKind::AirNow)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openaq" => Ok(SourceKind::OpenAq),
            "airnow" => Ok(SourceKind::AirNow),
            "tempo" => Ok(SourceKind::Tempo),
            "pandora" => Ok(SourceKind::Pandora),
            "tolnet" => Ok(SourceKind::Tolnet),
            other => Err(format!("Unknown source: {}", other)),
        }
    }
}

/// What to fetch from each source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Restrict to one city
    pub city: Option<String>,
    pub days_back: u32,
    pub parameters: Vec<Parameter>,
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self {
            city: None,
            days_back: 7,
            parameters: Parameter::ALL.to_vec(),
        }
    }
}

impl FetchRequest {
    /// Oldest timestamp the request covers
    pub fn earliest(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(Duration::days(i64::from(self.days_back)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Whether a record falls inside the `days_back` window
    ///
    /// Records whose timestamp is missing or unparseable are kept so the
    /// cleaner can reject them with a reason.
    pub fn covers(&self, record: &RawMeasurement, now: DateTime<Utc>) -> bool {
        match record.date_utc.as_ref().map(parse_timestamp) {
            Some(Ok(ts)) => ts >= self.earliest(now),
            _ => true,
        }
    }
}

/// Decode raw records one element at a time
///
/// Elements that do not fit the raw measurement schema are dropped and
/// counted; the rest of the batch survives.
pub fn parse_records(values: Vec<Value>) -> Vec<RawMeasurement> {
    let total = values.len();
    let records: Vec<RawMeasurement> = values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                let reason = RejectReason::Malformed(e.to_string());
                debug!("Dropping record {}: {}", index, reason);
                counter!("measurements_dropped_total", "reason" => reason.label()).increment(1);
                None
            }
        })
        .collect();
    if records.len() < total {
        debug!("Decoded {} of {} records", records.len(), total);
    }
    records
}

/// A source of raw measurement records
pub trait DataSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Fetch raw records; the records are cleaned by the caller
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawMeasurement>, IngestionError>;
}

/// Keep records matching the request's city and parameters
fn matches_request(record: &RawMeasurement, request: &FetchRequest) -> bool {
    let city_ok = match (&request.city, &record.city) {
        (Some(wanted), Some(city)) => city.trim().eq_ignore_ascii_case(wanted.trim()),
        (Some(_), None) => false,
        (None, _) => true,
    };
    let parameter_ok = record
        .parameter
        .as_deref()
        .and_then(Parameter::from_alias)
        .map_or(true, |p| request.parameters.contains(&p));
    city_ok && parameter_ok
}

/// Source replaying records held in memory
#[derive(Debug, Clone)]
pub struct RecordedSource {
    kind: SourceKind,
    records: Vec<RawMeasurement>,
}

impl RecordedSource {
    pub fn new(kind: SourceKind, records: Vec<RawMeasurement>) -> Self {
        Self { kind, records }
    }
}

impl DataSource for RecordedSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawMeasurement>, IngestionError> {
        Ok(self
            .records
            .iter()
            .filter(|r| matches_request(r, request))
            .cloned()
            .collect())
    }
}

/// Source reading a JSON array of raw records exported from an upstream API
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    kind: SourceKind,
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(kind: SourceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

impl DataSource for JsonFileSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawMeasurement>, IngestionError> {
        let bytes = fs::read(&self.path)?;
        let values: Vec<Value> = serde_json::from_slice(&bytes)?;
        let mut records = parse_records(values);
        debug!("Read {} records from {}", records.len(), self.path.display());

        for record in records.iter_mut() {
            if record.source.is_none() {
                record.source = Some(self.kind.as_str().to_string());
            }
        }
        records.retain(|r| matches_request(r, request));
        Ok(records)
    }
}
