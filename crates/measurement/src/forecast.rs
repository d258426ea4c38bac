//! Forecast Output Types

use crate::Parameter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Forecasting strategy, selected by data sufficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Linear trend over recent measurements
    Trend,
    /// Trained per-city regression model
    Model,
    /// Deterministic seeded fallback
    Fallback,
}

impl Tier {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Trend => "trend",
            Tier::Model => "model",
            Tier::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hourly forecast value with its confidence band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub city: String,
    pub parameter: Parameter,
    /// Target hour, strictly after generation time
    pub timestamp: DateTime<Utc>,
    pub predicted_value: f64,
    pub interval_lower: f64,
    pub interval_upper: f64,
}

impl ForecastPoint {
    /// Build a point from a prediction and a symmetric half-width,
    /// clamping everything at zero.
    pub fn with_half_width(
        city: &str,
        parameter: Parameter,
        timestamp: DateTime<Utc>,
        predicted: f64,
        half_width: f64,
    ) -> Self {
        let predicted_value = predicted.max(0.0);
        let half_width = half_width.abs();
        Self {
            city: city.to_string(),
            parameter,
            timestamp,
            predicted_value,
            interval_lower: (predicted_value - half_width).max(0.0),
            interval_upper: predicted_value + half_width,
        }
    }
}
