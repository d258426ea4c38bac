//! Regression Feature Rows
//!
//! Lags, rolling means, and differences are taken over arrival order, not
//! elapsed time, so an hourly series gives hour-based features.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

const LAGS: [usize; 6] = [1, 2, 3, 6, 12, 24];
const WINDOWS: [usize; 4] = [3, 6, 12, 24];

/// Number of features per row
pub const FEATURE_DIMENSION: usize = 16;

/// Leading rows dropped because their lag/rolling/diff values are undefined
pub const WARMUP_ROWS: usize = 24;

/// Feature names, in row order
pub const FEATURE_NAMES: [&str; FEATURE_DIMENSION] = [
    "hour",
    "day_of_week",
    "day_of_year",
    "month",
    "value_lag_1h",
    "value_lag_2h",
    "value_lag_3h",
    "value_lag_6h",
    "value_lag_12h",
    "value_lag_24h",
    "value_rolling_3h",
    "value_rolling_6h",
    "value_rolling_12h",
    "value_rolling_24h",
    "value_diff_1h",
    "value_diff_24h",
];

/// A timestamped value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// One training row: features plus the observed target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub timestamp: DateTime<Utc>,
    pub features: [f64; FEATURE_DIMENSION],
    pub target: f64,
}

/// Hour, weekday (Monday = 0), ordinal day, and month
pub fn calendar_features(ts: DateTime<Utc>) -> [f64; 4] {
    [
        ts.hour() as f64,
        ts.weekday().num_days_from_monday() as f64,
        ts.ordinal() as f64,
        ts.month() as f64,
    ]
}

/// Derive feature rows from a series, sorting it by time first.
///
/// The first [`WARMUP_ROWS`] observations only feed lags and are dropped.
pub fn derive_features(series: &[Observation]) -> Vec<FeatureRow> {
    let mut ordered = series.to_vec();
    ordered.sort_by_key(|o| o.timestamp);
    let values: Vec<f64> = ordered.iter().map(|o| o.value).collect();

    let rows: Vec<FeatureRow> = (WARMUP_ROWS..ordered.len())
        .map(|i| {
            let mut features = [0.0; FEATURE_DIMENSION];
            features[..4].copy_from_slice(&calendar_features(ordered[i].timestamp));

            for (slot, lag) in LAGS.iter().enumerate() {
                features[4 + slot] = values[i - lag];
            }
            for (slot, window) in WINDOWS.iter().enumerate() {
                let span = &values[i + 1 - window..=i];
                features[10 + slot] = span.iter().sum::<f64>() / *window as f64;
            }
            features[14] = values[i] - values[i - 1];
            features[15] = values[i] - values[i - 24];

            FeatureRow {
                timestamp: ordered[i].timestamp,
                features,
                target: values[i],
            }
        })
        .collect();

    debug!(
        "Derived {} feature rows from {} observations",
        rows.len(),
        series.len()
    );
    rows
}

/// Features for a future hour, holding every lag and rolling mean at the
/// latest known value and both differences at zero.
pub fn projected_features(latest_value: f64, target: DateTime<Utc>) -> [f64; FEATURE_DIMENSION] {
    let mut features = [latest_value; FEATURE_DIMENSION];
    features[..4].copy_from_slice(&calendar_features(target));
    features[14] = 0.0;
    features[15] = 0.0;
    features
}
