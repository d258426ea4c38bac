//! Forecast Routes

use axum::{
    extract::{Path, State},
    Json,
};
use forecaster::{ForecastBatch, ForecastRequest};
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use storage::ForecastRecord;
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

/// Response for the forecast endpoint
#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    /// Audit id shared by the persisted points
    pub batch_id: Uuid,
    #[serde(flatten)]
    pub forecast: ForecastBatch,
}

/// Generate and persist a forecast
pub async fn create_forecast(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ForecastRequest>,
) -> Result<Json<ForecastResponse>, ApiError> {
    // model loads and store scans block
    let (batch_id, forecast) = tokio::task::spawn_blocking(move || {
        let forecast = state.engine.forecast(&request)?;
        let batch_id = state.repository.insert_forecast_batch(
            forecast.metadata.model_type,
            &forecast.points,
            forecast.metadata.generated_at,
        )?;
        Ok::<_, ApiError>((batch_id, forecast))
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    counter!("forecast_batches_persisted_total").increment(1);

    Ok(Json(ForecastResponse { batch_id, forecast }))
}

/// Persisted points of one forecast batch
pub async fn get_forecast_batch(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<Vec<ForecastRecord>>, ApiError> {
    Ok(Json(state.repository.get_forecast_batch(batch_id)?))
}
