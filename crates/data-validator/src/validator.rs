//! Range and Time-Window Validation

use crate::error::RejectReason;
use chrono::{DateTime, Duration, Utc};
use measurement::Parameter;
use serde::{Deserialize, Serialize};

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// PM2.5 valid range (µg/m³)
    pub pm25_range: (f64, f64),
    /// O3 valid range (µg/m³)
    pub o3_range: (f64, f64),
    /// NO2 valid range (µg/m³)
    pub no2_range: (f64, f64),
    /// HCHO valid range (µg/m³)
    pub hcho_range: (f64, f64),
    /// Oldest accepted measurement age (days)
    pub max_age_days: i64,
    /// Furthest accepted clock skew into the future (days)
    pub max_future_days: i64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            pm25_range: (0.0, 500.0),
            o3_range: (0.0, 500.0),
            no2_range: (0.0, 500.0),
            hcho_range: (0.0, 50.0),
            max_age_days: 365,
            max_future_days: 1,
        }
    }
}

/// Range validator for cleaned measurements
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a single value against a range
    pub fn validate_range(
        &self,
        field: &str,
        value: f64,
        range: (f64, f64),
    ) -> Result<(), RejectReason> {
        if !(range.0..=range.1).contains(&value) {
            Err(RejectReason::OutOfRange {
                field: field.to_string(),
                value,
                min: range.0,
                max: range.1,
            })
        } else {
            Ok(())
        }
    }

    /// Plausible range for a canonical parameter name.
    ///
    /// Names outside the table have no range and are not validated.
    pub fn range_for(&self, parameter: &str) -> Option<(f64, f64)> {
        match Parameter::from_alias(parameter)? {
            Parameter::Pm25 => Some(self.config.pm25_range),
            Parameter::O3 => Some(self.config.o3_range),
            Parameter::No2 => Some(self.config.no2_range),
            Parameter::Hcho => Some(self.config.hcho_range),
        }
    }

    /// Validate a canonical value for its parameter
    pub fn validate_value(&self, parameter: &str, value: f64) -> Result<(), RejectReason> {
        match self.range_for(parameter) {
            Some(range) => self.validate_range(parameter, value, range),
            None => Ok(()),
        }
    }

    /// Validate that a timestamp lies in `[now - max_age, now + max_future]`
    pub fn validate_timestamp(
        &self,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), RejectReason> {
        let earliest = now - Duration::days(self.config.max_age_days);
        let latest = now + Duration::days(self.config.max_future_days);
        if timestamp < earliest || timestamp > latest {
            Err(RejectReason::OutsideWindow(timestamp.to_rfc3339()))
        } else {
            Ok(())
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}
