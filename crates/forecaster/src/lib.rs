//! Tiered Forecast Engine
//!
//! Picks one of three strategies per request from data sufficiency alone:
//! a trend over recent measurements, a trained regression model, or a
//! deterministic seeded fallback.

mod engine;
mod request;
mod tier;
mod trend;

pub use engine::{ForecastBatch, ForecastConfig, ForecastEngine, ForecastMetadata};
pub use request::{ForecastRequest, ValidatedRequest, MAX_CITY_LEN};
pub use tier::{select_tier, TierInputs};
pub use trend::{trend_diurnal_factor, trend_forecast, TrendForecast, TrendLabel};

use storage::StorageError;
use thiserror::Error;

/// Forecasting errors visible to callers
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
