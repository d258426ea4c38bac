//! Seeded Fallback Generator
//!
//! Every draw is derived from a seed hashed from (city, parameter, UTC hour),
//! so identical requests within the same hour produce identical values.

use chrono::{DateTime, Duration, Timelike, Utc};
use md5::{Digest, Md5};
use measurement::{ForecastPoint, Parameter};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Relative half-width of the fallback confidence band
const INTERVAL_FRACTION: f64 = 0.3;

/// Clamped normal distribution a parameter's fallback values are drawn from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseDistribution {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl BaseDistribution {
    const fn new(mean: f64, std_dev: f64, min: f64, max: f64) -> Self {
        Self {
            mean,
            std_dev,
            min,
            max,
        }
    }

    /// Base distribution for a parameter
    pub fn for_parameter(parameter: Parameter) -> Self {
        match parameter {
            Parameter::Pm25 => Self::new(15.0, 8.0, 0.0, 50.0),
            Parameter::O3 => Self::new(45.0, 15.0, 0.0, 100.0),
            Parameter::No2 => Self::new(25.0, 10.0, 0.0, 80.0),
            // no dedicated table entry
            Parameter::Hcho => Self::new(20.0, 10.0, 0.0, 50.0),
        }
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        let drawn = match Normal::new(self.mean, self.std_dev) {
            Ok(normal) => normal.sample(rng),
            Err(_) => self.mean,
        };
        drawn.clamp(self.min, self.max)
    }
}

/// Time-of-day multiplier for fallback values
///
/// Daytime is boosted more and night damped more than in the trend tier.
pub fn diurnal_factor(hour: u32) -> f64 {
    match hour {
        6..=18 => 1.2,
        22..=23 | 0..=5 => 0.7,
        _ => 1.0,
    }
}

/// Deterministic forecast generator used when no better tier applies
#[derive(Debug, Clone, Default)]
pub struct FallbackGenerator;

impl FallbackGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Seed for a (city, parameter) pair within the UTC hour of `now`
    pub fn seed(city: &str, parameter: Parameter, now: DateTime<Utc>) -> u64 {
        let mut hasher = Md5::new();
        hasher.update(format!("{}{}{}", city, parameter.as_str(), now.hour()).as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Generate `hours_ahead` hourly points starting one hour after `now`
    pub fn generate(
        &self,
        city: &str,
        parameter: Parameter,
        hours_ahead: usize,
        now: DateTime<Utc>,
    ) -> Vec<ForecastPoint> {
        let seed = Self::seed(city, parameter, now);
        let mut rng = StdRng::seed_from_u64(seed);
        let base = BaseDistribution::for_parameter(parameter);
        debug!(
            "Generating fallback for {} - {}: seed={:#018x}, hours={}",
            city, parameter, seed, hours_ahead
        );

        (1..=hours_ahead)
            .map(|i| {
                let timestamp = now + Duration::hours(i as i64);
                let predicted = base.sample(&mut rng) * diurnal_factor(timestamp.hour());
                ForecastPoint::with_half_width(
                    city,
                    parameter,
                    timestamp,
                    predicted,
                    predicted * INTERVAL_FRACTION,
                )
            })
            .collect()
    }
}
