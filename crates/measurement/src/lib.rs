//! Air Quality Domain Types
//!
//! Shared measurement, parameter, and forecast types used across the pipeline.

mod forecast;
mod parameter;
mod record;

pub use forecast::{ForecastPoint, Tier};
pub use parameter::{Parameter, UnknownParameter};
pub use record::{Measurement, ObservationKey, RawMeasurement, RawTimestamp, RawValue};

/// The single unit all concentrations are stored and compared in
pub const CANONICAL_UNIT: &str = "µg/m³";
