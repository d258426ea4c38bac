//! Trend Tier
//!
//! Extrapolates a least-squares line fitted over arrival order, scaled by a
//! time-of-day factor and capped at one and a half times the observed max.

use chrono::{DateTime, Duration, Timelike, Utc};
use feature_engine::StatisticalFeatures;
use measurement::{ForecastPoint, Parameter};
use serde::{Deserialize, Serialize};
use std::fmt;

/// z-value for a 95% interval
const Z_95: f64 = 1.96;
/// Slope magnitude below which a series counts as stable
const STABLE_SLOPE: f64 = 0.1;
/// Upper clamp relative to the observed maximum
const MAX_GROWTH: f64 = 1.5;

/// Coarse direction of recent measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendLabel {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendLabel {
    pub fn from_slope(slope: f64) -> Self {
        if slope > STABLE_SLOPE {
            TrendLabel::Increasing
        } else if slope < -STABLE_SLOPE {
            TrendLabel::Decreasing
        } else {
            TrendLabel::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrendLabel::Increasing => "increasing",
            TrendLabel::Decreasing => "decreasing",
            TrendLabel::Stable => "stable",
        }
    }
}

impl fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-of-day multiplier for trend predictions
pub fn trend_diurnal_factor(hour: u32) -> f64 {
    match hour {
        6..=18 => 1.1,
        22..=23 | 0..=5 => 0.9,
        _ => 1.0,
    }
}

/// Trend tier output
#[derive(Debug, Clone, PartialEq)]
pub struct TrendForecast {
    pub points: Vec<ForecastPoint>,
    pub average: f64,
    pub slope: f64,
    pub label: TrendLabel,
}

/// Forecast `hours_ahead` points from time-ascending recent values
pub fn trend_forecast(
    city: &str,
    parameter: Parameter,
    values: &[f64],
    hours_ahead: usize,
    now: DateTime<Utc>,
) -> TrendForecast {
    let stats = StatisticalFeatures::compute(values);
    let n = values.len() as f64;
    let ceiling = (MAX_GROWTH * stats.max).max(0.0);
    let half_width = Z_95 * stats.std_dev;

    let points = (1..=hours_ahead)
        .map(|i| {
            let timestamp = now + Duration::hours(i as i64);
            let raw = (stats.mean + stats.slope * (n + i as f64)) * trend_diurnal_factor(timestamp.hour());
            let predicted = raw.clamp(0.0, ceiling);
            ForecastPoint::with_half_width(city, parameter, timestamp, predicted, half_width)
        })
        .collect();

    TrendForecast {
        points,
        average: stats.mean,
        slope: stats.slope,
        label: TrendLabel::from_slope(stats.slope),
    }
}
