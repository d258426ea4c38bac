//! Outlier Detection
//!
//! Three interchangeable detectors over the same value series. Exactly one
//! is applied per call; results are never combined.

use crate::statistics::{mean, median, percentile, std_dev};
use measurement::Measurement;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Minimum series length for detection
const MIN_VALUES: usize = 3;

/// Detection method name that matches no detector
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown outlier method: {0}")]
pub struct UnknownOutlierMethod(pub String);

/// Outlier detection method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutlierMethod {
    /// Tukey fences around the interquartile range
    #[serde(rename = "iqr")]
    Iqr,
    /// Distance from the mean in standard deviations
    #[serde(rename = "zscore")]
    ZScore,
    /// Distance from the median in MAD units
    #[serde(rename = "modified_zscore")]
    ModifiedZScore,
}

impl FromStr for OutlierMethod {
    type Err = UnknownOutlierMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "iqr" => Ok(OutlierMethod::Iqr),
            "zscore" | "z_score" => Ok(OutlierMethod::ZScore),
            "modified_zscore" | "modified_z_score" => Ok(OutlierMethod::ModifiedZScore),
            _ => Err(UnknownOutlierMethod(s.to_string())),
        }
    }
}

/// Outlier detector with per-method thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierDetector {
    /// Fence multiplier for IQR
    pub iqr_multiplier: f64,
    /// Z-score cutoff
    pub z_threshold: f64,
    /// Modified z-score cutoff
    pub modified_z_threshold: f64,
}

impl Default for OutlierDetector {
    fn default() -> Self {
        Self {
            iqr_multiplier: 1.5,
            z_threshold: 3.0,
            modified_z_threshold: 3.5,
        }
    }
}

impl OutlierDetector {
    /// Indices of values flagged as outliers; empty for fewer than 3 values
    pub fn detect(&self, values: &[f64], method: OutlierMethod) -> BTreeSet<usize> {
        if values.len() < MIN_VALUES {
            return BTreeSet::new();
        }

        match method {
            OutlierMethod::Iqr => self.detect_iqr(values),
            OutlierMethod::ZScore => self.detect_zscore(values),
            OutlierMethod::ModifiedZScore => self.detect_modified_zscore(values),
        }
    }

    fn detect_iqr(&self, values: &[f64]) -> BTreeSet<usize> {
        let q1 = percentile(values, 25.0);
        let q3 = percentile(values, 75.0);
        let iqr = q3 - q1;
        let lower = q1 - self.iqr_multiplier * iqr;
        let upper = q3 + self.iqr_multiplier * iqr;

        flag_where(values, |v| v < lower || v > upper)
    }

    fn detect_zscore(&self, values: &[f64]) -> BTreeSet<usize> {
        let mu = mean(values);
        let sigma = std_dev(values);
        if sigma == 0.0 {
            return BTreeSet::new();
        }

        flag_where(values, |v| ((v - mu) / sigma).abs() > self.z_threshold)
    }

    fn detect_modified_zscore(&self, values: &[f64]) -> BTreeSet<usize> {
        let med = median(values);
        let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
        let mad = median(&deviations);
        if mad == 0.0 {
            return BTreeSet::new();
        }

        // 0.6745 is the 0.75 quantile of the standard normal
        flag_where(values, |v| (0.6745 * (v - med) / mad).abs() > self.modified_z_threshold)
    }
}

fn flag_where(values: &[f64], predicate: impl Fn(f64) -> bool) -> BTreeSet<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, &v)| predicate(v))
        .map(|(i, _)| i)
        .collect()
}

/// Copy a batch, setting `is_outlier` on every record of `parameter`.
///
/// Records of other parameters are copied unchanged. With fewer than three
/// matching records the batch is returned untouched.
pub fn flag_outliers(
    detector: &OutlierDetector,
    batch: &[Measurement],
    parameter: &str,
    method: OutlierMethod,
) -> Vec<Measurement> {
    let positions: Vec<usize> = batch
        .iter()
        .enumerate()
        .filter(|(_, m)| m.parameter == parameter)
        .map(|(i, _)| i)
        .collect();

    if positions.len() < MIN_VALUES {
        return batch.to_vec();
    }

    let values: Vec<f64> = positions.iter().map(|&i| batch[i].value).collect();
    let flagged = detector.detect(&values, method);
    debug!(
        "Flagged {} of {} {} values using {:?}",
        flagged.len(),
        values.len(),
        parameter,
        method
    );

    let mut result = batch.to_vec();
    for (series_index, &batch_index) in positions.iter().enumerate() {
        result[batch_index].is_outlier = Some(flagged.contains(&series_index));
    }
    result
}
