//! Feature Engineering Engine
//!
//! Provides descriptive statistics, outlier detection, and the lag/rolling
//! feature rows consumed by the regression model.

mod features;
mod outlier;
mod statistics;

pub use features::{
    calendar_features, derive_features, projected_features, FeatureRow, Observation,
    FEATURE_DIMENSION, FEATURE_NAMES, WARMUP_ROWS,
};
pub use outlier::{flag_outliers, OutlierDetector, OutlierMethod, UnknownOutlierMethod};
pub use statistics::{mean, median, ols_slope, percentile, std_dev, StatisticalFeatures};
