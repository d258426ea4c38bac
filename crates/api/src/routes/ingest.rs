//! Ingestion Routes

use axum::{extract::State, Json};
use chrono::Utc;
use ingestion::{parse_records, FetchRequest, IngestionSummary, SourceKind, SourceResult};
use measurement::Parameter;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ApiError;
use crate::AppState;

/// Body for the ingestion endpoint
///
/// With `records`, that batch is ingested as coming from `source`;
/// otherwise every configured source is polled.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IngestRequest {
    pub city: Option<String>,
    pub days_back: Option<u32>,
    pub parameters: Option<Vec<String>>,
    pub source: Option<String>,
    /// Raw records, decoded one at a time so a malformed entry is dropped alone
    pub records: Option<Vec<Value>>,
}

impl IngestRequest {
    fn fetch_request(&self, default_days: u32) -> Result<FetchRequest, ApiError> {
        let parameters = match &self.parameters {
            None => Parameter::ALL.to_vec(),
            Some(names) => names
                .iter()
                .map(|name| {
                    Parameter::from_alias(name)
                        .ok_or_else(|| ApiError::Validation(format!("unknown parameter '{}'", name)))
                })
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(FetchRequest {
            city: self.city.clone(),
            days_back: self.days_back.unwrap_or(default_days),
            parameters,
        })
    }
}

/// Ingest measurements and report per-source results
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(mut request): Json<IngestRequest>,
) -> Result<Json<IngestionSummary>, ApiError> {
    let manager = Arc::clone(&state.ingestion);

    let summary = match request.records.take() {
        Some(records) => {
            let kind: SourceKind = request
                .source
                .as_deref()
                .ok_or_else(|| ApiError::Validation("records require a source".into()))?
                .parse()
                .map_err(ApiError::Validation)?;
            let now = Utc::now();
            let written = tokio::task::spawn_blocking(move || {
                manager.ingest_batch(kind, &parse_records(records), now)
            })
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))??;

            let mut results = BTreeMap::new();
            results.insert(
                kind,
                SourceResult {
                    success: true,
                    records: written,
                    error: None,
                },
            );
            IngestionSummary {
                total_records: written,
                results,
                timestamp: now,
            }
        }
        None => {
            let fetch = request.fetch_request(state.settings.ingestion.days_back)?;
            tokio::task::spawn_blocking(move || manager.ingest_all(&fetch))
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?
        }
    };

    Ok(Json(summary))
}
