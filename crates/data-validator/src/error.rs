//! Cleaning Error Types

use thiserror::Error;

/// Errors converting a value into the canonical unit
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// Mixing-ratio unit for a parameter without a usable molecular weight
    #[error("No molecular weight for {parameter}; cannot convert from {unit}")]
    NoMolecularWeight { parameter: String, unit: String },

    /// NaN or infinite input
    #[error("Value {0} is not finite")]
    NonFinite(f64),
}

/// Reason a raw record was dropped during cleaning
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    /// Record does not fit the raw measurement schema
    #[error("Malformed record: {0}")]
    Malformed(String),

    /// Required field absent or blank
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Value could not be coerced to a number
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Timestamp could not be parsed
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Timestamp outside the accepted window
    #[error("Timestamp {0} outside accepted window")]
    OutsideWindow(String),

    /// Unit conversion failed
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Unit was not recognised, value left unconverted
    #[error("Unit {0} is not convertible to the canonical unit")]
    NonCanonicalUnit(String),

    /// Value out of the parameter's plausible range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl RejectReason {
    /// Short label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::Malformed(_) => "malformed",
            RejectReason::MissingField(_) => "missing_field",
            RejectReason::InvalidValue(_) => "invalid_value",
            RejectReason::InvalidTimestamp(_) => "invalid_timestamp",
            RejectReason::OutsideWindow(_) => "outside_window",
            RejectReason::Conversion(_) => "conversion",
            RejectReason::NonCanonicalUnit(_) => "non_canonical_unit",
            RejectReason::OutOfRange { .. } => "out_of_range",
        }
    }
}
