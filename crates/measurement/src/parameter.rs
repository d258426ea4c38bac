//! Pollutant Parameters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Parameter name that matches no known pollutant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown parameter: {0}")]
pub struct UnknownParameter(pub String);

/// Pollutant tracked by the forecasting pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Parameter {
    /// Fine particulate matter
    #[serde(rename = "PM2.5")]
    Pm25,
    /// Ozone
    #[serde(rename = "O3")]
    O3,
    /// Nitrogen dioxide
    #[serde(rename = "NO2")]
    No2,
    /// Formaldehyde
    #[serde(rename = "HCHO")]
    Hcho,
}

/// Case-folded alias -> parameter
const ALIASES: &[(&str, Parameter)] = &[
    ("pm25", Parameter::Pm25),
    ("pm2.5", Parameter::Pm25),
    ("pm2_5", Parameter::Pm25),
    ("o3", Parameter::O3),
    ("ozone", Parameter::O3),
    ("no2", Parameter::No2),
    ("nitrogen_dioxide", Parameter::No2),
    ("hcho", Parameter::Hcho),
    ("formaldehyde", Parameter::Hcho),
    ("h2co", Parameter::Hcho),
];

impl Parameter {
    /// All known parameters
    pub const ALL: [Parameter; 4] = [
        Parameter::Pm25,
        Parameter::O3,
        Parameter::No2,
        Parameter::Hcho,
    ];

    /// Canonical display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Parameter::Pm25 => "PM2.5",
            Parameter::O3 => "O3",
            Parameter::No2 => "NO2",
            Parameter::Hcho => "HCHO",
        }
    }

    /// Resolve a free-form name through the alias table
    pub fn from_alias(name: &str) -> Option<Self> {
        let folded = name.trim().to_lowercase();
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == folded)
            .map(|(_, param)| *param)
    }

    /// Normalize a parameter name: aliases map to the canonical name,
    /// anything else is passed through upper-cased.
    pub fn normalize_name(name: &str) -> String {
        match Self::from_alias(name) {
            Some(param) => param.as_str().to_string(),
            None => name.trim().to_uppercase(),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = UnknownParameter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_alias(s).ok_or_else(|| UnknownParameter(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_resolution() {
        assert_eq!(Parameter::from_alias("pm25"), Some(Parameter::Pm25));
        assert_eq!(Parameter::from_alias("PM2_5"), Some(Parameter::Pm25));
        assert_eq!(Parameter::from_alias(" Ozone "), Some(Parameter::O3));
        assert_eq!(Parameter::from_alias("nitrogen_dioxide"), Some(Parameter::No2));
        assert_eq!(Parameter::from_alias("h2co"), Some(Parameter::Hcho));
        assert_eq!(Parameter::from_alias("so2"), None);
    }

    #[test]
    fn test_normalize_name_passthrough() {
        assert_eq!(Parameter::normalize_name("formaldehyde"), "HCHO");
        assert_eq!(Parameter::normalize_name("so2"), "SO2");
        assert_eq!(Parameter::normalize_name("co"), "CO");
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        assert!("PM2.5".parse::<Parameter>().is_ok());
        let err = "CO".parse::<Parameter>().unwrap_err();
        assert_eq!(err.0, "CO");
    }

    #[test]
    fn test_serde_uses_canonical_names() {
        let json = serde_json::to_string(&Parameter::Pm25).unwrap();
        assert_eq!(json, "\"PM2.5\"");
        let parsed: Parameter = serde_json::from_str("\"NO2\"").unwrap();
        assert_eq!(parsed, Parameter::No2);
    }
}
