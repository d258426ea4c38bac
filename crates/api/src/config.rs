//! Service Configuration
//!
//! Defaults, then an optional TOML file, then `AIRSENSE__SECTION__KEY`
//! environment variables. Validated once at load.

use forecaster::ForecastConfig;
use inference_engine::TrainerConfig;
use ingestion::SourceKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use storage::StorageConfig;
use thiserror::Error;
use tracing::Level;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "AIRSENSE";
/// Default configuration file, without extension
pub const DEFAULT_CONFIG_FILE: &str = "airsense";
/// Longest accepted recent window, in hours
pub const MAX_RECENT_WINDOW_HOURS: i64 = 24 * 366;
/// Longest accepted model lookback, in days
pub const MAX_MODEL_LOOKBACK_DAYS: i64 = 366;
/// Longest accepted training history, in days
pub const MAX_HISTORY_DAYS: i64 = 3660;

/// Configuration errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Model training settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// History window used for training, in days
    pub history_days: i64,
    pub min_raw_points: usize,
    pub min_feature_rows: usize,
    pub test_fraction: f64,
    pub ridge_lambda: f64,
    /// Pending training jobs before submitters wait
    pub queue_capacity: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        let trainer = TrainerConfig::default();
        Self {
            history_days: 90,
            min_raw_points: trainer.min_raw_points,
            min_feature_rows: trainer.min_feature_rows,
            test_fraction: trainer.test_fraction,
            ridge_lambda: trainer.ridge_lambda,
            queue_capacity: 8,
        }
    }
}

impl TrainingSettings {
    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            min_raw_points: self.min_raw_points,
            min_feature_rows: self.min_feature_rows,
            test_fraction: self.test_fraction,
            ridge_lambda: self.ridge_lambda,
        }
    }
}

/// Model persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Directory for persisted models; `None` keeps models in memory
    pub dir: Option<PathBuf>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            dir: Some(PathBuf::from("models")),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingSettings {
    pub fn max_level(&self) -> Result<Level, SettingsError> {
        Level::from_str(&self.level)
            .map_err(|_| SettingsError::Invalid(format!("unknown log level '{}'", self.level)))
    }
}

/// One file-backed upstream source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    pub kind: SourceKind,
    pub path: PathBuf,
}

/// Ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    pub days_back: u32,
    pub sources: Vec<SourceSettings>,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            days_back: 7,
            sources: Vec::new(),
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub forecast: ForecastConfig,
    pub training: TrainingSettings,
    pub storage: StorageConfig,
    pub models: ModelSettings,
    pub logging: LoggingSettings,
    pub ingestion: IngestionSettings,
}

impl Settings {
    /// Load from `{file}.toml` if present, then the environment
    pub fn load(file: Option<&str>) -> Result<Self, SettingsError> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::with_name(file.unwrap_or(DEFAULT_CONFIG_FILE)).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), SettingsError> {
        let f = &self.forecast;
        if f.min_hours_ahead < 1 || f.min_hours_ahead > f.max_hours_ahead {
            return Err(SettingsError::Invalid(format!(
                "forecast horizon bounds must satisfy 1 <= min <= max, got {}..={}",
                f.min_hours_ahead, f.max_hours_ahead
            )));
        }
        if !(f.min_hours_ahead..=f.max_hours_ahead).contains(&f.default_hours_ahead) {
            return Err(SettingsError::Invalid(format!(
                "default horizon {} outside {}..={}",
                f.default_hours_ahead, f.min_hours_ahead, f.max_hours_ahead
            )));
        }
        if f.trend_threshold == 0 || f.recent_limit == 0 || f.model_min_recent_points == 0 {
            return Err(SettingsError::Invalid(
                "forecast thresholds must be positive".into(),
            ));
        }
        if !(1..=MAX_RECENT_WINDOW_HOURS).contains(&f.recent_window_hours) {
            return Err(SettingsError::Invalid(format!(
                "recent window must lie in 1..={} hours, got {}",
                MAX_RECENT_WINDOW_HOURS, f.recent_window_hours
            )));
        }
        if !(1..=MAX_MODEL_LOOKBACK_DAYS).contains(&f.model_lookback_days) {
            return Err(SettingsError::Invalid(format!(
                "model lookback must lie in 1..={} days, got {}",
                MAX_MODEL_LOOKBACK_DAYS, f.model_lookback_days
            )));
        }

        let t = &self.training;
        if !(t.test_fraction > 0.0 && t.test_fraction < 1.0) {
            return Err(SettingsError::Invalid(format!(
                "training test fraction must lie in (0, 1), got {}",
                t.test_fraction
            )));
        }
        if !(1..=MAX_HISTORY_DAYS).contains(&t.history_days) {
            return Err(SettingsError::Invalid(format!(
                "training history must lie in 1..={} days, got {}",
                MAX_HISTORY_DAYS, t.history_days
            )));
        }
        if t.min_raw_points == 0 || t.min_feature_rows == 0 || t.queue_capacity == 0 {
            return Err(SettingsError::Invalid(
                "training thresholds must be positive".into(),
            ));
        }

        if self.storage.max_measurements == 0 || self.storage.max_forecasts == 0 {
            return Err(SettingsError::Invalid("storage caps must be positive".into()));
        }

        self.logging.max_level()?;
        Ok(())
    }
}
