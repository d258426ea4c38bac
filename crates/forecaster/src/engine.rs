//! Forecast Engine
//!
//! Collaborators are injected at construction. The tier is decided from
//! counts gathered up front; a tier that cannot produce points degrades to
//! the fallback, which always succeeds.

use crate::request::{ForecastRequest, ValidatedRequest};
use crate::tier::{select_tier, TierInputs};
use crate::trend::{trend_forecast, TrendLabel};
use crate::ForecastError;
use chrono::{DateTime, Duration, Utc};
use fallback::{FallbackGenerator, PredictionCache};
use feature_engine::{mean, Observation};
use inference_engine::{InferenceError, ModelProvider, Regressor};
use measurement::{ForecastPoint, Measurement, Parameter, Tier};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use storage::HistoryStore;
use tracing::{debug, info, warn};

/// Forecast engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Recent measurements needed for the trend tier
    pub trend_threshold: usize,
    /// Max recent measurements read per request
    pub recent_limit: usize,
    /// Recent window, in hours
    pub recent_window_hours: i64,
    /// Model history window, in days
    pub model_lookback_days: i64,
    /// Minimum model-window measurements for the model tier
    pub model_min_recent_points: usize,
    pub min_hours_ahead: usize,
    pub max_hours_ahead: usize,
    pub default_hours_ahead: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            trend_threshold: 12,
            recent_limit: 24,
            recent_window_hours: 24,
            model_lookback_days: 7,
            model_min_recent_points: 24,
            min_hours_ahead: 1,
            max_hours_ahead: 168,
            default_hours_ahead: 24,
        }
    }
}

/// Description of how a forecast batch was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetadata {
    pub model_type: Tier,
    pub data_source: String,
    pub data_points_used: usize,
    /// Mean of the values the forecast was based on
    pub average: Option<f64>,
    pub trend: Option<TrendLabel>,
    /// R² of the trained model, model tier only
    pub model_accuracy: Option<f64>,
    pub generated_at: DateTime<Utc>,
}

/// Forecast points for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastBatch {
    pub city: String,
    pub parameter: Parameter,
    pub points: Vec<ForecastPoint>,
    pub metadata: ForecastMetadata,
}

/// Tiered forecaster over a history store and a model provider
pub struct ForecastEngine {
    store: Arc<dyn HistoryStore>,
    models: Arc<dyn ModelProvider>,
    cache: Arc<PredictionCache<ForecastBatch>>,
    generator: FallbackGenerator,
    config: ForecastConfig,
}

impl ForecastEngine {
    /// Create a new engine
    pub fn new(
        store: Arc<dyn HistoryStore>,
        models: Arc<dyn ModelProvider>,
        cache: Arc<PredictionCache<ForecastBatch>>,
        config: ForecastConfig,
    ) -> Self {
        info!(
            "Creating forecast engine: trend_threshold={}, horizon={}..={}",
            config.trend_threshold, config.min_hours_ahead, config.max_hours_ahead
        );
        Self {
            store,
            models,
            cache,
            generator: FallbackGenerator::new(),
            config,
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast from the current wall clock
    pub fn forecast(&self, request: &ForecastRequest) -> Result<ForecastBatch, ForecastError> {
        self.forecast_at(request, Utc::now())
    }

    /// Forecast as if the current time were `now`
    pub fn forecast_at(
        &self,
        request: &ForecastRequest,
        now: DateTime<Utc>,
    ) -> Result<ForecastBatch, ForecastError> {
        let request = request.validate(&self.config)?;
        let (city, parameter) = (request.city.as_str(), request.parameter);

        let recent = self.store.recent(
            city,
            parameter,
            now - Duration::hours(self.config.recent_window_hours),
            self.config.recent_limit,
        )?;

        let mut model = None;
        let mut model_history = Vec::new();
        if recent.len() < self.config.trend_threshold {
            model = self.lookup_model(city, parameter);
            if model.is_some() {
                model_history = self.store.range(
                    city,
                    parameter,
                    now - Duration::days(self.config.model_lookback_days),
                    now,
                )?;
            }
        }

        let inputs = TierInputs {
            recent_points: recent.len(),
            model_available: model.is_some(),
            model_history_points: model_history.len(),
            model_min_points: model
                .as_ref()
                .map(|m| m.min_recent_points())
                .unwrap_or(0)
                .max(self.config.model_min_recent_points),
        };
        let tier = select_tier(&inputs, &self.config);
        debug!("Tier inputs for {} - {}: {:?}", city, parameter, inputs);

        let batch = match (tier, model) {
            (Tier::Trend, _) => self.trend_tier(&request, recent, now),
            (Tier::Model, Some(model)) => {
                match self.model_tier(&request, model.as_ref(), &model_history, now) {
                    Ok(batch) => batch,
                    Err(e) => {
                        warn!("Model tier failed for {} - {}: {}", city, parameter, e);
                        self.fallback_tier(&request, now)
                    }
                }
            }
            _ => self.fallback_tier(&request, now),
        };

        counter!("forecasts_generated_total", "tier" => batch.metadata.model_type.as_str())
            .increment(1);
        info!(
            "Generated {} forecast points for {} - {} using {} tier ({} data points)",
            batch.points.len(),
            city,
            parameter,
            batch.metadata.model_type,
            batch.metadata.data_points_used
        );
        Ok(batch)
    }

    fn lookup_model(&self, city: &str, parameter: Parameter) -> Option<Arc<dyn Regressor>> {
        match self.models.model_for(city, parameter) {
            Ok(model) => Some(model),
            Err(InferenceError::ModelNotFound { .. }) => {
                debug!("No trained model for {} - {}", city, parameter);
                None
            }
            Err(e) => {
                warn!("Model unavailable for {} - {}: {}", city, parameter, e);
                None
            }
        }
    }

    fn trend_tier(
        &self,
        request: &ValidatedRequest,
        mut recent: Vec<Measurement>,
        now: DateTime<Utc>,
    ) -> ForecastBatch {
        recent.sort_by(|a, b| a.date_utc.cmp(&b.date_utc));
        let values: Vec<f64> = recent.iter().map(|m| m.value).collect();
        let trend = trend_forecast(
            &request.city,
            request.parameter,
            &values,
            request.hours_ahead,
            now,
        );

        ForecastBatch {
            city: request.city.clone(),
            parameter: request.parameter,
            points: trend.points,
            metadata: ForecastMetadata {
                model_type: Tier::Trend,
                data_source: source_label(&recent),
                data_points_used: values.len(),
                average: Some(trend.average),
                trend: Some(trend.label),
                model_accuracy: None,
                generated_at: now,
            },
        }
    }

    fn model_tier(
        &self,
        request: &ValidatedRequest,
        model: &dyn Regressor,
        history: &[Measurement],
        now: DateTime<Utc>,
    ) -> Result<ForecastBatch, InferenceError> {
        let observations: Vec<Observation> = history
            .iter()
            .map(|m| Observation::new(m.date_utc, m.value))
            .collect();
        let forecast = model.predict(&observations, request.hours_ahead, now)?;

        let points = forecast
            .values
            .iter()
            .zip(&forecast.intervals)
            .enumerate()
            .map(|(i, (&value, &(lower, upper)))| {
                let predicted_value = value.max(0.0);
                let interval_lower = lower.max(0.0).min(predicted_value);
                ForecastPoint {
                    city: request.city.clone(),
                    parameter: request.parameter,
                    timestamp: now + Duration::hours(i as i64 + 1),
                    predicted_value,
                    interval_lower,
                    interval_upper: upper.max(predicted_value),
                }
            })
            .collect();

        let values: Vec<f64> = history.iter().map(|m| m.value).collect();
        Ok(ForecastBatch {
            city: request.city.clone(),
            parameter: request.parameter,
            points,
            metadata: ForecastMetadata {
                model_type: Tier::Model,
                data_source: source_label(history),
                data_points_used: forecast.data_points_used,
                average: Some(mean(&values)),
                trend: None,
                model_accuracy: Some(model.metrics().r2),
                generated_at: now,
            },
        })
    }

    fn fallback_tier(&self, request: &ValidatedRequest, now: DateTime<Utc>) -> ForecastBatch {
        let (city, parameter, hours) = (request.city.as_str(), request.parameter, request.hours_ahead);
        if let Some(cached) = self.cache.get_at(city, parameter, hours, now) {
            return cached;
        }

        let batch = ForecastBatch {
            city: request.city.clone(),
            parameter,
            points: self.generator.generate(city, parameter, hours, now),
            metadata: ForecastMetadata {
                model_type: Tier::Fallback,
                data_source: "synthetic".to_string(),
                data_points_used: 0,
                average: None,
                trend: None,
                model_accuracy: None,
                generated_at: now,
            },
        };
        self.cache.put_at(city, parameter, hours, batch.clone(), now);
        batch
    }
}

/// Distinct upstream sources, joined for display
fn source_label(records: &[Measurement]) -> String {
    let sources: BTreeSet<&str> = records.iter().map(|m| m.source.as_str()).collect();
    if sources.is_empty() {
        "historical".to_string()
    } else {
        sources.into_iter().collect::<Vec<_>>().join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use inference_engine::{ModelRegistry, Trainer};
    use measurement::CANONICAL_UNIT;
    use storage::Repository;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 15, 10, 20, 0).unwrap()
    }

    fn measurement(city: &str, parameter: Parameter, at: DateTime<Utc>, value: f64) -> Measurement {
        Measurement {
            city: city.to_string(),
            parameter: parameter.as_str().to_string(),
            value,
            unit: CANONICAL_UNIT.to_string(),
            date_utc: at,
            source: "openaq".to_string(),
            is_outlier: None,
            original: None,
        }
    }

    struct Fixture {
        repo: Arc<Repository>,
        registry: Arc<ModelRegistry>,
        cache: Arc<PredictionCache<ForecastBatch>>,
        engine: ForecastEngine,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(Repository::default());
        let registry = Arc::new(ModelRegistry::in_memory());
        let cache = Arc::new(PredictionCache::new());
        let engine = ForecastEngine::new(
            repo.clone(),
            registry.clone(),
            cache.clone(),
            ForecastConfig::default(),
        );
        Fixture {
            repo,
            registry,
            cache,
            engine,
        }
    }

    fn train_model(registry: &ModelRegistry, city: &str, parameter: Parameter) {
        let start = now() - Duration::days(30);
        let history: Vec<Observation> = (0..300)
            .map(|h| {
                let value = 20.0 + 8.0 * ((h % 24) as f64 / 24.0 * std::f64::consts::TAU).sin();
                Observation::new(start + Duration::hours(h), value)
            })
            .collect();
        let model = Trainer::default().train(city, parameter, &history).unwrap();
        registry.install(model).unwrap();
    }

    #[test]
    fn test_fifteen_points_without_model_uses_trend() {
        let f = fixture();
        let batch: Vec<_> = (0..15)
            .map(|h| measurement("Austin", Parameter::Pm25, now() - Duration::hours(h), 10.0 + h as f64))
            .collect();
        f.repo.insert_measurements(&batch).unwrap();

        let result = f
            .engine
            .forecast_at(&ForecastRequest::new("Austin", "PM2.5", 24), now())
            .unwrap();
        assert_eq!(result.metadata.model_type, Tier::Trend);
        assert_eq!(result.metadata.data_points_used, 15);
        assert_eq!(result.metadata.data_source, "openaq");
        assert_eq!(result.metadata.trend, Some(TrendLabel::Decreasing));
        assert_eq!(result.points.len(), 24);
        assert!(result.points.iter().all(|p| p.timestamp > now()));
    }

    #[test]
    fn test_no_data_uses_fallback() {
        let f = fixture();
        let result = f
            .engine
            .forecast_at(&ForecastRequest::new("Austin", "NO2", 24), now())
            .unwrap();
        assert_eq!(result.metadata.model_type, Tier::Fallback);
        assert_eq!(result.points.len(), 24);
        assert_eq!(f.cache.len(), 1);
    }

    #[test]
    fn test_fallback_deterministic_within_hour() {
        let f = fixture();
        let request = ForecastRequest::new("Austin", "NO2", 24);
        let first = f.engine.forecast_at(&request, now()).unwrap();

        // fresh engine without a shared cache still recomputes identical values
        let other = fixture();
        let later = now() + Duration::minutes(30);
        let second = other.engine.forecast_at(&request, later).unwrap();

        let a: Vec<u64> = first.points.iter().map(|p| p.predicted_value.to_bits()).collect();
        let b: Vec<u64> = second.points.iter().map(|p| p.predicted_value.to_bits()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fallback_cache_returns_prior_payload() {
        let f = fixture();
        let request = ForecastRequest::new("Austin", "O3", 6);
        let first = f.engine.forecast_at(&request, now()).unwrap();
        let second = f
            .engine
            .forecast_at(&request, now() + Duration::minutes(10))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(second.metadata.generated_at, now());
    }

    #[test]
    fn test_sparse_recent_data_with_model_uses_model() {
        let f = fixture();
        train_model(&f.registry, "Austin", Parameter::Pm25);

        // every 5 hours over a week: 34 points in the model window, 5 in the last day
        let batch: Vec<_> = (0..34)
            .map(|k| measurement("Austin", Parameter::Pm25, now() - Duration::hours(5 * k), 18.0))
            .collect();
        f.repo.insert_measurements(&batch).unwrap();

        let result = f
            .engine
            .forecast_at(&ForecastRequest::new("Austin", "pm25", 12), now())
            .unwrap();
        assert_eq!(result.metadata.model_type, Tier::Model);
        assert_eq!(result.metadata.data_points_used, 34);
        assert!(result.metadata.model_accuracy.is_some());
        assert_eq!(result.points.len(), 12);
        for point in &result.points {
            assert!(point.predicted_value >= 0.0);
            assert!(point.interval_lower <= point.predicted_value);
            assert!(point.predicted_value <= point.interval_upper);
        }
    }

    #[test]
    fn test_model_without_enough_history_falls_back() {
        let f = fixture();
        train_model(&f.registry, "Austin", Parameter::Pm25);
        let batch: Vec<_> = (0..5)
            .map(|h| measurement("Austin", Parameter::Pm25, now() - Duration::hours(h), 18.0))
            .collect();
        f.repo.insert_measurements(&batch).unwrap();

        let result = f
            .engine
            .forecast_at(&ForecastRequest::new("Austin", "PM2.5", 12), now())
            .unwrap();
        assert_eq!(result.metadata.model_type, Tier::Fallback);
    }

    #[test]
    fn test_validation_runs_before_tiers() {
        let f = fixture();
        let err = f
            .engine
            .forecast_at(&ForecastRequest::new("Austin", "SO2", 24), now())
            .unwrap_err();
        assert!(matches!(err, ForecastError::Validation(_)));

        let err = f
            .engine
            .forecast_at(&ForecastRequest::new("Austin", "NO2", 169), now())
            .unwrap_err();
        assert!(matches!(err, ForecastError::Validation(_)));
        assert!(f.cache.is_empty());
    }

    #[test]
    fn test_metadata_serializes_tier_name() {
        let f = fixture();
        let result = f
            .engine
            .forecast_at(&ForecastRequest::new("Austin", "NO2", 1), now())
            .unwrap();
        let json = serde_json::to_value(&result.metadata).unwrap();
        assert_eq!(json["model_type"], "fallback");
    }
}
