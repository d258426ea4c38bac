//! Measurement Routes

use axum::{
    extract::{Query, State},
    Json,
};
use measurement::{Measurement, Parameter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::MeasurementQuery;

use crate::error::ApiError;
use crate::AppState;

/// Query parameters for the measurements endpoint
#[derive(Debug, Deserialize)]
pub struct MeasurementParams {
    /// Filter by city name
    pub city: Option<String>,
    /// Filter by parameter name or alias
    pub parameter: Option<String>,
    /// Maximum number of records
    pub limit: Option<usize>,
}

/// Response for the measurements endpoint
#[derive(Debug, Serialize)]
pub struct MeasurementResponse {
    pub data: Vec<Measurement>,
    pub count: usize,
    pub limit: usize,
}

/// List stored measurements, most recent first
pub async fn get_measurements(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MeasurementParams>,
) -> Result<Json<MeasurementResponse>, ApiError> {
    let parameter = params
        .parameter
        .as_deref()
        .map(|name| {
            Parameter::from_alias(name)
                .ok_or_else(|| ApiError::Validation(format!("unknown parameter '{}'", name)))
        })
        .transpose()?;

    let query = MeasurementQuery {
        city: params.city.filter(|c| !c.trim().is_empty()),
        parameter,
        limit: params.limit,
    };
    let data = state.repository.query_measurements(&query)?;

    Ok(Json(MeasurementResponse {
        count: data.len(),
        limit: query.effective_limit(),
        data,
    }))
}
