//! Measurement Validation and Normalization
//!
//! Provides unit normalization, range checking, and batch cleaning for
//! air-quality measurements pulled from upstream APIs.

mod aggregate;
mod cleaner;
mod error;
mod normalizer;
mod validator;

pub use aggregate::{aggregate, Aggregation};
pub use cleaner::{parse_timestamp, CleaningReport, MeasurementCleaner};
pub use error::{ConversionError, RejectReason};
pub use normalizer::{NormalizedValue, UnitNormalizer};
pub use validator::{ValidationConfig, Validator};
