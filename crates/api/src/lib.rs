//! AirSense API Server
//!
//! REST API over measurement ingestion, tiered forecasting, and model
//! training.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use data_validator::{MeasurementCleaner, ValidationConfig};
use fallback::PredictionCache;
use forecaster::ForecastEngine;
use inference_engine::{ModelRegistry, Trainer, TrainingHandle, TrainingWorker};
use ingestion::{IngestionManager, JsonFileSource};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use storage::Repository;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::FmtSubscriber;

pub mod config;
pub mod error;
mod routes;

pub use config::{LogFormat, LoggingSettings, Settings, SettingsError};
pub use error::ApiError;

/// Application state shared across handlers
pub struct AppState {
    /// Storage repository
    pub repository: Arc<Repository>,
    /// Tiered forecaster
    pub engine: ForecastEngine,
    /// Trained models
    pub registry: Arc<ModelRegistry>,
    /// Submits jobs to the training worker
    pub trainer: TrainingHandle,
    /// Source polling and batch ingestion
    pub ingestion: Arc<IngestionManager>,
    /// Prometheus exposition
    pub metrics: PrometheusHandle,
    pub settings: Settings,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
}

impl AppState {
    /// Wire every component from settings
    ///
    /// The returned worker must be spawned for training requests to complete.
    pub fn build(
        settings: Settings,
        metrics: PrometheusHandle,
    ) -> Result<(Self, TrainingWorker), ApiError> {
        let repository = Arc::new(Repository::new(settings.storage.clone()));
        let registry = Arc::new(match &settings.models.dir {
            Some(dir) => ModelRegistry::new(dir)?,
            None => ModelRegistry::in_memory(),
        });

        let engine = ForecastEngine::new(
            repository.clone(),
            registry.clone(),
            Arc::new(PredictionCache::new()),
            settings.forecast.clone(),
        );

        let (trainer, worker) = TrainingWorker::channel(
            settings.training.queue_capacity,
            Trainer::new(settings.training.trainer_config()),
            registry.clone(),
        );

        let mut ingestion = IngestionManager::new(
            MeasurementCleaner::new(ValidationConfig::default()),
            repository.clone(),
        );
        for source in &settings.ingestion.sources {
            ingestion = ingestion.with_source(JsonFileSource::new(source.kind, &source.path));
        }

        let state = Self {
            repository,
            engine,
            registry,
            trainer,
            ingestion: Arc::new(ingestion),
            metrics,
            settings,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        };
        Ok((state, worker))
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_seconds: u64,
    pub metrics: StoreMetrics,
}

/// Store counters
#[derive(Debug, Serialize)]
pub struct StoreMetrics {
    pub measurement_count: usize,
    pub forecast_count: usize,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/forecast", post(routes::forecast::create_forecast))
        .route(
            "/api/v1/forecasts/:batch_id",
            get(routes::forecast::get_forecast_batch),
        )
        .route("/api/v1/measurements", get(routes::measurements::get_measurements))
        .route(
            "/api/v1/models/train",
            post(routes::models::train_model).delete(routes::models::cancel_training),
        )
        .route("/api/v1/ingest", post(routes::ingest::ingest))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        metrics: StoreMetrics {
            measurement_count: state.repository.measurement_count(),
            forecast_count: state.repository.forecast_count(),
        },
    })
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Initialize logging
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    let level = settings.max_level()?;
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    match settings.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish())?,
    }
    Ok(())
}

/// Run the server until it fails
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let metrics = PrometheusBuilder::new().install_recorder()?;
    let addr = settings.server.bind_addr.clone();

    let (state, worker) = AppState::build(settings, metrics)?;
    tokio::spawn(worker.run());
    let app = create_router(Arc::new(state));

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
