//! Regression Model Engine
//!
//! Trains, persists, and evaluates the per-(city, parameter) regression
//! models behind the model forecast tier.

mod engine;
mod registry;
mod worker;

pub use engine::{
    LinearModel, ModelForecast, Regressor, Trainer, TrainerConfig, TrainingMetrics,
};
pub use registry::{ModelProvider, ModelRegistry};
pub use worker::{TrainingHandle, TrainingWorker};

use thiserror::Error;

/// Errors from training and prediction
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("Insufficient data for {stage}: need at least {needed}, found {got}")]
    InsufficientData {
        stage: &'static str,
        needed: usize,
        got: usize,
    },
    #[error("No trained model found for {city} - {parameter}")]
    ModelNotFound { city: String, parameter: String },
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Model persistence failed: {0}")]
    PersistError(String),
    #[error("Training failed: {0}")]
    TrainingFailed(String),
    #[error("Training cancelled")]
    Cancelled,
}
