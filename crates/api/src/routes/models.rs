//! Model Training Routes

use axum::{extract::State, http::StatusCode, Json};
use chrono::{Duration, Utc};
use feature_engine::Observation;
use forecaster::MAX_CITY_LEN;
use inference_engine::TrainingMetrics;
use measurement::Parameter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::HistoryStore;
use tracing::info;

use crate::error::ApiError;
use crate::AppState;

/// Body for the training endpoint
#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    pub city: String,
    /// Parameter name or alias; defaults to PM2.5
    #[serde(default)]
    pub parameter: Option<String>,
}

/// Response for the training endpoint
#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub success: bool,
    pub message: String,
    pub training_metrics: TrainingMetrics,
}

/// Response for the cancel endpoint
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

fn validate(request: &TrainRequest) -> Result<(String, Parameter), ApiError> {
    let city = request.city.trim();
    if city.is_empty() || city.chars().count() > MAX_CITY_LEN {
        return Err(ApiError::Validation(format!(
            "city must be 1 to {} characters",
            MAX_CITY_LEN
        )));
    }
    let parameter = match request.parameter.as_deref() {
        None => Parameter::Pm25,
        Some(name) => Parameter::from_alias(name)
            .ok_or_else(|| ApiError::Validation(format!("unknown parameter '{}'", name)))?,
    };
    Ok((city.to_string(), parameter))
}

/// Train a model on the configured history window
pub async fn train_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrainRequest>,
) -> Result<Json<TrainResponse>, ApiError> {
    let (city, parameter) = validate(&request)?;
    info!("Training model for {} - {}", city, parameter);

    let now = Utc::now();
    let start = now - Duration::days(state.settings.training.history_days);
    let history: Vec<Observation> = state
        .repository
        .range(&city, parameter, start, now)?
        .into_iter()
        .map(|m| Observation::new(m.date_utc, m.value))
        .collect();

    let training_metrics = state.trainer.train(&city, parameter, history).await?;

    Ok(Json(TrainResponse {
        success: true,
        message: format!("Model trained successfully for {} - {}", city, parameter),
        training_metrics,
    }))
}

/// Cancel the training job in progress
pub async fn cancel_training(State(state): State<Arc<AppState>>) -> (StatusCode, Json<CancelResponse>) {
    state.trainer.cancel_current();
    (StatusCode::ACCEPTED, Json(CancelResponse { cancelled: true }))
}
