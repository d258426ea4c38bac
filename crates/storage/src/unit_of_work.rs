//! Unit of Work
//!
//! Writes are staged and validated up front, then applied under the store
//! locks in one step. Dropping an uncommitted unit discards everything staged.

use crate::repository::{ForecastRecord, Repository, SeenKeys};
use crate::StorageError;
use chrono::{DateTime, Utc};
use measurement::{ForecastPoint, Measurement, Tier, CANONICAL_UNIT};
use tracing::{debug, info};
use uuid::Uuid;

/// Counts reported by a successful commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub measurements_written: usize,
    pub duplicates_skipped: usize,
    pub forecasts_written: usize,
}

struct Staged {
    measurement: Measurement,
    skip_existing: bool,
}

/// A batch of writes that commit together or not at all
pub struct UnitOfWork<'a> {
    repo: &'a Repository,
    measurements: Vec<Staged>,
    forecasts: Vec<ForecastRecord>,
}

impl<'a> UnitOfWork<'a> {
    pub(crate) fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            measurements: Vec::new(),
            forecasts: Vec::new(),
        }
    }

    /// Stage a cleaned measurement
    pub fn add_measurement(&mut self, measurement: Measurement) -> Result<(), StorageError> {
        validate_measurement(&measurement)?;
        self.measurements.push(Staged {
            measurement,
            skip_existing: false,
        });
        Ok(())
    }

    /// Stage a measurement that is dropped at commit if already stored
    pub fn add_measurement_if_absent(
        &mut self,
        measurement: Measurement,
    ) -> Result<(), StorageError> {
        validate_measurement(&measurement)?;
        self.measurements.push(Staged {
            measurement,
            skip_existing: true,
        });
        Ok(())
    }

    /// Stage one forecast point
    pub fn add_forecast(
        &mut self,
        batch_id: Uuid,
        tier: Tier,
        point: ForecastPoint,
        created_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if point.city.trim().is_empty() {
            return Err(StorageError::InvalidRecord("forecast without city".into()));
        }
        if !(point.predicted_value >= 0.0
            && point.interval_lower >= 0.0
            && point.interval_upper >= point.interval_lower)
        {
            return Err(StorageError::InvalidRecord(format!(
                "forecast bounds out of order at {}",
                point.timestamp
            )));
        }
        self.forecasts.push(ForecastRecord {
            id: 0,
            batch_id,
            tier,
            point,
            created_at,
        });
        Ok(())
    }

    /// Apply every staged write
    pub fn commit(self) -> Result<CommitSummary, StorageError> {
        let mut summary = CommitSummary::default();
        let mut log = self.repo.lock_measurements()?;
        let mut forecasts = self.repo.lock_forecasts()?;
        let mut next_id = self
            .repo
            .next_forecast_id
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))?;

        let mut seen = SeenKeys::default();
        let mut accepted: Vec<Measurement> = Vec::with_capacity(self.measurements.len());
        for staged in self.measurements {
            let fresh = seen.insert_new(&log, &staged.measurement);
            if staged.skip_existing && !fresh {
                summary.duplicates_skipped += 1;
                continue;
            }
            accepted.push(staged.measurement);
        }

        summary.measurements_written = accepted.len();
        for measurement in accepted {
            log.push_bounded(measurement, self.repo.config.max_measurements);
        }

        summary.forecasts_written = self.forecasts.len();
        for mut record in self.forecasts {
            record.id = *next_id;
            *next_id += 1;
            while forecasts.len() >= self.repo.config.max_forecasts.max(1) {
                forecasts.pop_front();
            }
            forecasts.push_back(record);
        }

        if summary.duplicates_skipped > 0 {
            debug!("Skipped {} duplicate measurements", summary.duplicates_skipped);
        }
        info!(
            "Committed {} measurements and {} forecast points",
            summary.measurements_written, summary.forecasts_written
        );
        Ok(summary)
    }

    /// Discard every staged write
    pub fn rollback(self) {
        debug!(
            "Rolled back {} measurements and {} forecast points",
            self.measurements.len(),
            self.forecasts.len()
        );
    }
}

fn validate_measurement(m: &Measurement) -> Result<(), StorageError> {
    if m.city.trim().is_empty() {
        return Err(StorageError::InvalidRecord("measurement without city".into()));
    }
    if !m.value.is_finite() {
        return Err(StorageError::InvalidRecord(format!(
            "non-finite value for {} - {}",
            m.city, m.parameter
        )));
    }
    if m.unit != CANONICAL_UNIT {
        return Err(StorageError::InvalidRecord(format!(
            "non-canonical unit '{}' for {} - {}",
            m.unit, m.city, m.parameter
        )));
    }
    Ok(())
}
