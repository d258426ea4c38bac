//! Forecast Request Validation

use crate::engine::ForecastConfig;
use crate::ForecastError;
use measurement::Parameter;
use serde::{Deserialize, Serialize};

/// Longest accepted city name, in characters
pub const MAX_CITY_LEN: usize = 100;

/// Forecast request as received at the boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub city: String,
    /// Parameter name or alias; defaults to PM2.5
    #[serde(default)]
    pub parameter: Option<String>,
    #[serde(default)]
    pub hours_ahead: Option<i64>,
}

/// Request that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub city: String,
    pub parameter: Parameter,
    pub hours_ahead: usize,
}

impl ForecastRequest {
    pub fn new(city: &str, parameter: &str, hours_ahead: i64) -> Self {
        Self {
            city: city.to_string(),
            parameter: Some(parameter.to_string()),
            hours_ahead: Some(hours_ahead),
        }
    }

    /// Check the request against the configured bounds
    pub fn validate(&self, config: &ForecastConfig) -> Result<ValidatedRequest, ForecastError> {
        let city = self.city.trim();
        if city.is_empty() {
            return Err(ForecastError::Validation("city must not be empty".into()));
        }
        if city.chars().count() > MAX_CITY_LEN {
            return Err(ForecastError::Validation(format!(
                "city must be at most {} characters",
                MAX_CITY_LEN
            )));
        }

        let parameter = match self.parameter.as_deref() {
            None => Parameter::Pm25,
            Some(name) => Parameter::from_alias(name).ok_or_else(|| {
                ForecastError::Validation(format!("unknown parameter '{}'", name))
            })?,
        };

        let hours_ahead = self
            .hours_ahead
            .unwrap_or(config.default_hours_ahead as i64);
        if hours_ahead < config.min_hours_ahead as i64 || hours_ahead > config.max_hours_ahead as i64 {
            return Err(ForecastError::Validation(format!(
                "hours_ahead must be between {} and {}, got {}",
                config.min_hours_ahead, config.max_hours_ahead, hours_ahead
            )));
        }

        Ok(ValidatedRequest {
            city: city.to_string(),
            parameter,
            hours_ahead: hours_ahead as usize,
        })
    }
}
