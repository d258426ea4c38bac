//! Ridge-Regularised Linear Regressor
//!
//! Multi-step prediction holds the lag, rolling, and difference features at
//! the latest known value instead of feeding predictions back as history.

use crate::InferenceError;
use chrono::{DateTime, Duration, Utc};
use feature_engine::{
    derive_features, projected_features, FeatureRow, Observation, FEATURE_DIMENSION,
    FEATURE_NAMES,
};
use measurement::Parameter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// z-value for a 95% interval
const Z_95: f64 = 1.96;

/// Recent points required before a model may predict
pub const MIN_RECENT_POINTS: usize = 24;

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Minimum raw observations before feature derivation
    pub min_raw_points: usize,
    /// Minimum feature rows after warm-up rows are dropped
    pub min_feature_rows: usize,
    /// Trailing fraction of rows held out for evaluation
    pub test_fraction: f64,
    /// Ridge penalty on standardised coefficients
    pub ridge_lambda: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            min_raw_points: 100,
            min_feature_rows: 50,
            test_fraction: 0.2,
            ridge_lambda: 1e-3,
        }
    }
}

/// Evaluation metrics from a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Mean absolute error on the held-out rows
    pub mae: f64,
    /// Coefficient of determination on the held-out rows
    pub r2: f64,
    pub training_samples: usize,
    pub test_samples: usize,
    /// Normalised absolute standardised coefficients
    pub feature_importance: BTreeMap<String, f64>,
}

/// Predictions from a regression model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelForecast {
    /// One value per future hour
    pub values: Vec<f64>,
    /// `(lower, upper)` 95% interval per value
    pub intervals: Vec<(f64, f64)>,
    /// Recent observations the forecast was based on
    pub data_points_used: usize,
}

/// A trained model able to forecast from recent history
pub trait Regressor: Send + Sync {
    /// Forecast `hours_ahead` hourly values after `now`
    fn predict(
        &self,
        recent: &[Observation],
        hours_ahead: usize,
        now: DateTime<Utc>,
    ) -> Result<ModelForecast, InferenceError>;

    /// Metrics recorded when the model was trained
    fn metrics(&self) -> &TrainingMetrics;

    /// Recent observations needed by [`Regressor::predict`]
    fn min_recent_points(&self) -> usize {
        MIN_RECENT_POINTS
    }
}

/// Fitted linear model over standardised features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub city: String,
    pub parameter: Parameter,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub feature_means: Vec<f64>,
    pub feature_scales: Vec<f64>,
    /// Held-out residual RMSE, used as the predictive σ
    pub residual_std: f64,
    pub metrics: TrainingMetrics,
    pub trained_at: DateTime<Utc>,
}

impl LinearModel {
    /// Evaluate the model on one feature row
    pub fn evaluate(&self, features: &[f64; FEATURE_DIMENSION]) -> f64 {
        features
            .iter()
            .zip(&self.coefficients)
            .zip(self.feature_means.iter().zip(&self.feature_scales))
            .fold(self.intercept, |acc, ((x, beta), (mu, scale))| {
                acc + beta * (x - mu) / scale
            })
    }
}

impl Regressor for LinearModel {
    fn predict(
        &self,
        recent: &[Observation],
        hours_ahead: usize,
        now: DateTime<Utc>,
    ) -> Result<ModelForecast, InferenceError> {
        if recent.len() < MIN_RECENT_POINTS {
            return Err(InferenceError::InsufficientData {
                stage: "prediction",
                needed: MIN_RECENT_POINTS,
                got: recent.len(),
            });
        }

        let latest = recent
            .iter()
            .max_by_key(|o| o.timestamp)
            .map(|o| o.value)
            .unwrap_or_default();
        let half_width = Z_95 * self.residual_std;

        let mut values = Vec::with_capacity(hours_ahead);
        let mut intervals = Vec::with_capacity(hours_ahead);
        for hour in 1..=hours_ahead {
            let target = now + Duration::hours(hour as i64);
            let value = self.evaluate(&projected_features(latest, target)).max(0.0);
            values.push(value);
            intervals.push(((value - half_width).max(0.0), value + half_width));
        }

        debug!(
            "Model predicted {} hours for {} - {}",
            hours_ahead, self.city, self.parameter
        );

        Ok(ModelForecast {
            values,
            intervals,
            data_points_used: recent.len(),
        })
    }

    fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }
}

/// Fits [`LinearModel`]s from historical observations
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    /// Create a new trainer
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Train a model on a time-ascending history
    pub fn train(
        &self,
        city: &str,
        parameter: Parameter,
        history: &[Observation],
    ) -> Result<LinearModel, InferenceError> {
        info!("Training model for {} - {}", city, parameter);

        if history.len() < self.config.min_raw_points {
            return Err(InferenceError::InsufficientData {
                stage: "training",
                needed: self.config.min_raw_points,
                got: history.len(),
            });
        }

        let rows = derive_features(history);
        if rows.len() < self.config.min_feature_rows {
            return Err(InferenceError::InsufficientData {
                stage: "feature preparation",
                needed: self.config.min_feature_rows,
                got: rows.len(),
            });
        }

        let test_len = ((rows.len() as f64 * self.config.test_fraction).ceil() as usize)
            .clamp(1, rows.len() - 1);
        let (train, test) = rows.split_at(rows.len() - test_len);

        let (feature_means, feature_scales) = column_moments(train);
        let target_mean = train.iter().map(|r| r.target).sum::<f64>() / train.len() as f64;
        let coefficients = fit_ridge(
            train,
            &feature_means,
            &feature_scales,
            target_mean,
            self.config.ridge_lambda,
        )?;

        let mut model = LinearModel {
            city: city.to_string(),
            parameter,
            intercept: target_mean,
            coefficients,
            feature_means,
            feature_scales,
            residual_std: 0.0,
            metrics: TrainingMetrics {
                mae: 0.0,
                r2: 0.0,
                training_samples: train.len(),
                test_samples: test.len(),
                feature_importance: BTreeMap::new(),
            },
            trained_at: Utc::now(),
        };

        let residuals: Vec<f64> = test
            .iter()
            .map(|r| r.target - model.evaluate(&r.features))
            .collect();
        let test_mean = test.iter().map(|r| r.target).sum::<f64>() / test.len() as f64;
        let ss_res: f64 = residuals.iter().map(|e| e * e).sum();
        let ss_tot: f64 = test.iter().map(|r| (r.target - test_mean).powi(2)).sum();

        model.residual_std = (ss_res / test.len() as f64).sqrt();
        model.metrics.mae = residuals.iter().map(|e| e.abs()).sum::<f64>() / test.len() as f64;
        model.metrics.r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };
        model.metrics.feature_importance = importance(&model.coefficients);

        info!(
            "Model trained successfully. MAE: {:.2}, R²: {:.2}",
            model.metrics.mae, model.metrics.r2
        );
        Ok(model)
    }
}

fn column_moments(rows: &[FeatureRow]) -> (Vec<f64>, Vec<f64>) {
    let n = rows.len() as f64;
    let mut means = vec![0.0; FEATURE_DIMENSION];
    for row in rows {
        for (m, x) in means.iter_mut().zip(&row.features) {
            *m += x / n;
        }
    }

    let mut scales = vec![0.0; FEATURE_DIMENSION];
    for row in rows {
        for ((s, x), m) in scales.iter_mut().zip(&row.features).zip(&means) {
            *s += (x - m).powi(2) / n;
        }
    }
    for s in scales.iter_mut() {
        // constant columns standardise to zero and keep a zero coefficient
        *s = if *s > 1e-12 { s.sqrt() } else { 1.0 };
    }

    (means, scales)
}

fn fit_ridge(
    rows: &[FeatureRow],
    means: &[f64],
    scales: &[f64],
    target_mean: f64,
    lambda: f64,
) -> Result<Vec<f64>, InferenceError> {
    let k = FEATURE_DIMENSION;
    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];

    for row in rows {
        let z: Vec<f64> = (0..k).map(|j| (row.features[j] - means[j]) / scales[j]).collect();
        let y = row.target - target_mean;
        for i in 0..k {
            xty[i] += z[i] * y;
            for j in 0..=i {
                xtx[i][j] += z[i] * z[j];
            }
        }
    }
    for i in 0..k {
        for j in 0..i {
            xtx[j][i] = xtx[i][j];
        }
        // ridge penalty plus jitter for numerical stability
        xtx[i][i] += lambda * rows.len() as f64 + 1e-8;
    }

    solve_symmetric(&xtx, &xty).ok_or_else(|| {
        InferenceError::TrainingFailed(
            "ridge regression failed: matrix not positive definite".into(),
        )
    })
}

/// Solve `A x = b` for symmetric positive-definite `A` by Cholesky
/// decomposition, or `None` if `A` is not positive definite.
fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n || a.iter().any(|row| row.len() != n) {
        return None;
    }

    // A = L L'
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for p in 0..j {
                sum -= l[i][p] * l[j][p];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    // L y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for p in 0..i {
            sum -= l[i][p] * y[p];
        }
        y[i] = sum / l[i][i];
    }

    // L' x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for p in (i + 1)..n {
            sum -= l[p][i] * x[p];
        }
        x[i] = sum / l[i][i];
    }
    Some(x)
}

fn importance(coefficients: &[f64]) -> BTreeMap<String, f64> {
    let total: f64 = coefficients.iter().map(|c| c.abs()).sum();
    FEATURE_NAMES
        .iter()
        .zip(coefficients)
        .map(|(name, c)| {
            let share = if total > 0.0 { c.abs() / total } else { 0.0 };
            (name.to_string(), share)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    pub(crate) fn diurnal_series(len: usize) -> Vec<Observation> {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        (0..len)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * (i % 24) as f64 / 24.0;
                let noise = ((i * 7919) % 13) as f64 * 0.05;
                Observation::new(base + Duration::hours(i as i64), 20.0 + 5.0 * phase.sin() + noise)
            })
            .collect()
    }

    #[test]
    fn test_solve_symmetric_small_system() {
        let a = vec![vec![4.0, 2.0], vec![2.0, 3.0]];
        let x = solve_symmetric(&a, &[10.0, 8.0]).unwrap();
        assert_relative_eq!(x[0], 1.75, epsilon = 1e-12);
        assert_relative_eq!(x[1], 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_solve_symmetric_rejects_bad_input() {
        assert!(solve_symmetric(&[vec![0.0]], &[1.0]).is_none());
        assert!(solve_symmetric(&[vec![1.0, 0.0]], &[1.0]).is_none());
        assert!(solve_symmetric(&[], &[]).is_none());
        // indefinite
        assert!(solve_symmetric(&[vec![1.0, 2.0], vec![2.0, 1.0]], &[1.0, 1.0]).is_none());
    }

    #[test]
    fn test_train_requires_raw_points() {
        let trainer = Trainer::default();
        let err = trainer
            .train("Austin", Parameter::Pm25, &diurnal_series(99))
            .unwrap_err();
        assert_eq!(
            err,
            InferenceError::InsufficientData {
                stage: "training",
                needed: 100,
                got: 99
            }
        );
    }

    #[test]
    fn test_train_requires_feature_rows() {
        let trainer = Trainer::new(TrainerConfig {
            min_feature_rows: 90,
            ..Default::default()
        });
        // 110 raw points leave 86 rows after the 24-row warm-up
        let err = trainer
            .train("Austin", Parameter::Pm25, &diurnal_series(110))
            .unwrap_err();
        assert!(matches!(
            err,
            InferenceError::InsufficientData {
                stage: "feature preparation",
                got: 86,
                ..
            }
        ));
    }

    #[test]
    fn test_train_fits_diurnal_series() {
        let trainer = Trainer::default();
        let model = trainer
            .train("Austin", Parameter::O3, &diurnal_series(240))
            .unwrap();

        assert_eq!(model.metrics.training_samples + model.metrics.test_samples, 216);
        assert_eq!(model.metrics.test_samples, 44);
        assert!(model.metrics.r2 > 0.8, "r2 = {}", model.metrics.r2);
        assert!(model.metrics.mae < 1.5, "mae = {}", model.metrics.mae);

        let total: f64 = model.metrics.feature_importance.values().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
        assert_eq!(model.metrics.feature_importance.len(), FEATURE_DIMENSION);
    }

    #[test]
    fn test_predict_shape_and_intervals() {
        let history = diurnal_series(240);
        let model = Trainer::default()
            .train("Austin", Parameter::O3, &history)
            .unwrap();
        let now = history.last().unwrap().timestamp;

        let forecast = model.predict(&history[history.len() - 48..], 12, now).unwrap();
        assert_eq!(forecast.values.len(), 12);
        assert_eq!(forecast.intervals.len(), 12);
        assert_eq!(forecast.data_points_used, 48);
        for (value, (lower, upper)) in forecast.values.iter().zip(&forecast.intervals) {
            assert!(*value >= 0.0);
            assert!(*lower >= 0.0 && lower <= value && value <= upper);
        }
    }

    #[test]
    fn test_predict_requires_recent_points() {
        let history = diurnal_series(240);
        let model = Trainer::default()
            .train("Austin", Parameter::O3, &history)
            .unwrap();
        let err = model
            .predict(&history[..10], 6, history[9].timestamp)
            .unwrap_err();
        assert!(matches!(err, InferenceError::InsufficientData { got: 10, .. }));
    }
}
