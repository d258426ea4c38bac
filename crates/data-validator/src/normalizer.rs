//! Unit Normalization to µg/m³
//!
//! Mixing ratios (ppm/ppb) are converted with a simplified factor of
//! `1000 × MW` and `1 × MW` respectively. This is not the full ideal-gas
//! conversion and is kept that way so stored values stay comparable with
//! historical data.

use crate::error::ConversionError;
use measurement::{Parameter, CANONICAL_UNIT};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Multiplicative factors for mass-concentration units (case-folded keys)
const MASS_FACTORS: &[(&str, f64)] = &[
    ("µg/m³", 1.0),
    ("μg/m³", 1.0),
    ("ug/m3", 1.0),
    ("ug/m³", 1.0),
    ("µg/m3", 1.0),
    ("mg/m³", 1000.0),
    ("mg/m3", 1000.0),
];

/// Result of a normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedValue {
    /// Converted value (or the input value when the unit is unknown)
    pub value: f64,
    /// Canonical unit, or the trimmed input unit when unknown
    pub unit: String,
    /// Whether `unit` is the canonical unit
    pub canonical: bool,
}

impl NormalizedValue {
    /// Split into the `(value, unit)` pair
    pub fn into_pair(self) -> (f64, String) {
        (self.value, self.unit)
    }
}

/// Mixing-ratio units that need a molecular weight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MixingRatio {
    Ppm,
    Ppb,
}

impl MixingRatio {
    fn parse(unit: &str) -> Option<Self> {
        match unit {
            "ppm" => Some(MixingRatio::Ppm),
            "ppb" => Some(MixingRatio::Ppb),
            _ => None,
        }
    }

    fn factor(&self) -> f64 {
        match self {
            MixingRatio::Ppm => 1000.0,
            MixingRatio::Ppb => 1.0,
        }
    }
}

/// Converts raw `(value, unit, parameter)` triples into µg/m³
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitNormalizer;

impl UnitNormalizer {
    /// Create a new normalizer
    pub fn new() -> Self {
        Self
    }

    /// Molecular weight (g/mol) for gaseous parameters.
    ///
    /// PM2.5 is a particle mass, not a gas, so it has none.
    pub fn molecular_weight(parameter: Parameter) -> Option<f64> {
        match parameter {
            Parameter::O3 => Some(48.0),
            Parameter::No2 => Some(46.0),
            Parameter::Hcho => Some(30.0),
            Parameter::Pm25 => None,
        }
    }

    /// Normalize a value into the canonical unit.
    ///
    /// Unknown units are returned unconverted with `canonical == false` so
    /// later range validation can reject them.
    pub fn normalize(
        &self,
        value: f64,
        unit: &str,
        parameter: &str,
    ) -> Result<NormalizedValue, ConversionError> {
        if !value.is_finite() {
            return Err(ConversionError::NonFinite(value));
        }

        let folded = unit.trim().to_lowercase();

        if let Some((_, factor)) = MASS_FACTORS.iter().find(|(key, _)| *key == folded) {
            return Ok(NormalizedValue {
                value: value * factor,
                unit: CANONICAL_UNIT.to_string(),
                canonical: true,
            });
        }

        if let Some(ratio) = MixingRatio::parse(&folded) {
            let weight = Parameter::from_alias(parameter)
                .and_then(Self::molecular_weight)
                .ok_or_else(|| ConversionError::NoMolecularWeight {
                    parameter: parameter.to_string(),
                    unit: folded.clone(),
                })?;

            return Ok(NormalizedValue {
                value: value * ratio.factor() * weight,
                unit: CANONICAL_UNIT.to_string(),
                canonical: true,
            });
        }

        warn!("Unknown unit '{}' for parameter '{}'", unit.trim(), parameter);
        Ok(NormalizedValue {
            value,
            unit: unit.trim().to_string(),
            canonical: false,
        })
    }
}
