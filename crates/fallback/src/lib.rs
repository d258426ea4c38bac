//! Deterministic Fallback Forecasts
//!
//! Produces reproducible forecasts when neither recent history nor a trained
//! model is available, and memoizes them for the rest of the calendar hour.

mod cache;
mod seeded;

pub use cache::{CacheKey, PredictionCache};
pub use seeded::{diurnal_factor, BaseDistribution, FallbackGenerator};
