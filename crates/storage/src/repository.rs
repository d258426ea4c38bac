//! Repository Implementation

use crate::history::HistoryStore;
use crate::unit_of_work::UnitOfWork;
use crate::StorageError;
use chrono::{DateTime, Utc};
use measurement::{ForecastPoint, Measurement, ObservationKey, Parameter, Tier};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// Default number of rows returned by a measurement query
pub const DEFAULT_QUERY_LIMIT: usize = 100;
/// Hard cap on rows returned by a measurement query
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Retention caps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Max stored measurements; oldest inserts are evicted first
    pub max_measurements: usize,
    /// Max stored forecast points
    pub max_forecasts: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_measurements: 1_000_000,
            max_forecasts: 100_000,
        }
    }
}

/// Persisted forecast point with its batch audit fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub id: i64,
    /// Shared by every point produced by one request
    pub batch_id: Uuid,
    pub tier: Tier,
    pub point: ForecastPoint,
    pub created_at: DateTime<Utc>,
}

/// Filter for the measurements listing
#[derive(Debug, Clone, Default)]
pub struct MeasurementQuery {
    pub city: Option<String>,
    pub parameter: Option<Parameter>,
    pub limit: Option<usize>,
}

impl MeasurementQuery {
    /// Requested limit, defaulted and capped
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT)
    }

    fn matches(&self, m: &Measurement) -> bool {
        self.city.as_deref().map_or(true, |c| m.city == c)
            && self.parameter.map_or(true, |p| m.parameter == p.as_str())
    }
}

/// Bounded measurement log with an index of stored observations
#[derive(Debug, Default)]
pub(crate) struct MeasurementLog {
    rows: VecDeque<Measurement>,
    /// Stored rows per observation key
    keys: HashMap<ObservationKey, usize>,
}

impl MeasurementLog {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: VecDeque::with_capacity(capacity),
            keys: HashMap::new(),
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.rows.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn contains(&self, key: &ObservationKey) -> bool {
        self.keys.contains_key(key)
    }

    /// Append, evicting the oldest rows beyond `capacity`
    pub(crate) fn push_bounded(&mut self, measurement: Measurement, capacity: usize) {
        while self.rows.len() >= capacity.max(1) {
            let Some(evicted) = self.rows.pop_front() else {
                break;
            };
            let key = evicted.observation_key();
            if let Some(count) = self.keys.get_mut(&key) {
                *count -= 1;
                if *count == 0 {
                    self.keys.remove(&key);
                }
            }
        }
        *self.keys.entry(measurement.observation_key()).or_insert(0) += 1;
        self.rows.push_back(measurement);
    }
}

/// Tracks observation keys seen while staging a commit
#[derive(Debug, Default)]
pub(crate) struct SeenKeys(HashSet<ObservationKey>);

impl SeenKeys {
    /// Record `m`; false if it was already stored or seen
    pub(crate) fn insert_new(&mut self, log: &MeasurementLog, m: &Measurement) -> bool {
        let key = m.observation_key();
        !log.contains(&key) && self.0.insert(key)
    }
}

/// Repository for data access (in-memory implementation)
pub struct Repository {
    /// Measurements in insertion order
    pub(crate) measurements: Mutex<MeasurementLog>,
    /// Forecast points in insertion order
    pub(crate) forecasts: Mutex<VecDeque<ForecastRecord>>,
    /// Next forecast record ID
    pub(crate) next_forecast_id: Mutex<i64>,
    pub(crate) config: StorageConfig,
}

impl Repository {
    /// Create a new in-memory repository
    pub fn new(config: StorageConfig) -> Self {
        info!(
            "Creating in-memory repository: max_measurements={}, max_forecasts={}",
            config.max_measurements, config.max_forecasts
        );
        Self {
            measurements: Mutex::new(MeasurementLog::with_capacity(10_000)),
            forecasts: Mutex::new(VecDeque::with_capacity(1_000)),
            next_forecast_id: Mutex::new(1),
            config,
        }
    }

    /// Start a batch of writes that commit together
    pub fn begin(&self) -> UnitOfWork<'_> {
        UnitOfWork::new(self)
    }

    /// Persist a cleaned batch in one unit of work
    pub fn insert_measurements(&self, batch: &[Measurement]) -> Result<usize, StorageError> {
        let mut uow = self.begin();
        for m in batch {
            uow.add_measurement(m.clone())?;
        }
        Ok(uow.commit()?.measurements_written)
    }

    /// Persist a batch, skipping records already stored
    pub fn insert_new_measurements(&self, batch: &[Measurement]) -> Result<usize, StorageError> {
        let mut uow = self.begin();
        for m in batch {
            uow.add_measurement_if_absent(m.clone())?;
        }
        Ok(uow.commit()?.measurements_written)
    }

    /// Persist one forecast batch under a fresh batch id
    pub fn insert_forecast_batch(
        &self,
        tier: Tier,
        points: &[ForecastPoint],
        created_at: DateTime<Utc>,
    ) -> Result<Uuid, StorageError> {
        let batch_id = Uuid::new_v4();
        let mut uow = self.begin();
        for point in points {
            uow.add_forecast(batch_id, tier, point.clone(), created_at)?;
        }
        uow.commit()?;
        debug!("Inserted forecast batch {} ({} points)", batch_id, points.len());
        Ok(batch_id)
    }

    /// Most recent measurements matching a query
    pub fn query_measurements(
        &self,
        query: &MeasurementQuery,
    ) -> Result<Vec<Measurement>, StorageError> {
        let log = self.lock_measurements()?;
        let mut rows: Vec<Measurement> = log.iter().filter(|m| query.matches(m)).cloned().collect();
        rows.sort_by(|a, b| b.date_utc.cmp(&a.date_utc));
        rows.truncate(query.effective_limit());
        Ok(rows)
    }

    /// Forecast points of one batch, in generation order
    pub fn get_forecast_batch(&self, batch_id: Uuid) -> Result<Vec<ForecastRecord>, StorageError> {
        let forecasts = self.lock_forecasts()?;
        let rows: Vec<_> = forecasts
            .iter()
            .filter(|r| r.batch_id == batch_id)
            .cloned()
            .collect();
        if rows.is_empty() {
            return Err(StorageError::NotFound);
        }
        Ok(rows)
    }

    /// Get total measurement count
    pub fn measurement_count(&self) -> usize {
        self.measurements.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Get total forecast point count
    pub fn forecast_count(&self) -> usize {
        self.forecasts.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub(crate) fn lock_measurements(
        &self,
    ) -> Result<MutexGuard<'_, MeasurementLog>, StorageError> {
        self.measurements
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
    }

    pub(crate) fn lock_forecasts(
        &self,
    ) -> Result<MutexGuard<'_, VecDeque<ForecastRecord>>, StorageError> {
        self.forecasts
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new(StorageConfig::default())
    }
}

impl HistoryStore for Repository {
    fn recent(
        &self,
        city: &str,
        parameter: Parameter,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Measurement>, StorageError> {
        let log = self.lock_measurements()?;
        let mut rows: Vec<Measurement> = log
            .iter()
            .filter(|m| m.city == city && m.parameter == parameter.as_str() && m.date_utc >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date_utc.cmp(&a.date_utc));
        rows.truncate(limit);
        Ok(rows)
    }

    fn range(
        &self,
        city: &str,
        parameter: Parameter,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Measurement>, StorageError> {
        let log = self.lock_measurements()?;
        let mut rows: Vec<Measurement> = log
            .iter()
            .filter(|m| {
                m.city == city
                    && m.parameter == parameter.as_str()
                    && m.date_utc >= start
                    && m.date_utc <= end
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.date_utc.cmp(&b.date_utc));
        Ok(rows)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use measurement::CANONICAL_UNIT;

    pub(crate) fn measurement(city: &str, parameter: Parameter, hours_ago: i64, value: f64) -> Measurement {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        Measurement {
            city: city.to_string(),
            parameter: parameter.as_str().to_string(),
            value,
            unit: CANONICAL_UNIT.to_string(),
            date_utc: base - Duration::hours(hours_ago),
            source: "openaq".to_string(),
            is_outlier: None,
            original: None,
        }
    }

    #[test]
    fn test_insert_and_query_most_recent_first() {
        let repo = Repository::default();
        let batch: Vec<_> = (0..5)
            .map(|h| measurement("Austin", Parameter::Pm25, h, h as f64))
            .collect();
        assert_eq!(repo.insert_measurements(&batch).unwrap(), 5);

        let rows = repo
            .query_measurements(&MeasurementQuery {
                city: Some("Austin".into()),
                parameter: Some(Parameter::Pm25),
                limit: Some(3),
            })
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.windows(2).all(|w| w[0].date_utc >= w[1].date_utc));
        assert_eq!(rows[0].value, 0.0);
    }

    #[test]
    fn test_query_limit_defaults_and_caps() {
        assert_eq!(MeasurementQuery::default().effective_limit(), DEFAULT_QUERY_LIMIT);
        let huge = MeasurementQuery {
            limit: Some(50_000),
            ..Default::default()
        };
        assert_eq!(huge.effective_limit(), MAX_QUERY_LIMIT);
    }

    #[test]
    fn test_recent_respects_since_and_limit() {
        let repo = Repository::default();
        let batch: Vec<_> = (0..48)
            .map(|h| measurement("Austin", Parameter::O3, h, 10.0))
            .chain(std::iter::once(measurement("Austin", Parameter::No2, 1, 3.0)))
            .collect();
        repo.insert_measurements(&batch).unwrap();

        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let rows = repo
            .recent("Austin", Parameter::O3, now - Duration::hours(24), 100)
            .unwrap();
        assert_eq!(rows.len(), 25);
        let rows = repo
            .recent("Austin", Parameter::O3, now - Duration::hours(24), 10)
            .unwrap();
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].date_utc, now);
    }

    #[test]
    fn test_range_is_ascending() {
        let repo = Repository::default();
        let batch: Vec<_> = (0..10)
            .map(|h| measurement("Austin", Parameter::O3, h, h as f64))
            .collect();
        repo.insert_measurements(&batch).unwrap();

        let end = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let rows = repo
            .range("Austin", Parameter::O3, end - Duration::hours(5), end)
            .unwrap();
        assert_eq!(rows.len(), 6);
        assert!(rows.windows(2).all(|w| w[0].date_utc < w[1].date_utc));
    }

    #[test]
    fn test_forecast_batch_round_trip() {
        let repo = Repository::default();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let points: Vec<_> = (1..=3)
            .map(|i| {
                ForecastPoint::with_half_width("Austin", Parameter::No2, now + Duration::hours(i), 20.0, 4.0)
            })
            .collect();

        let batch_id = repo.insert_forecast_batch(Tier::Fallback, &points, now).unwrap();
        let stored = repo.get_forecast_batch(batch_id).unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|r| r.tier == Tier::Fallback && r.batch_id == batch_id));
        assert_eq!(stored[0].id, 1);
        assert!(matches!(
            repo.get_forecast_batch(Uuid::new_v4()),
            Err(StorageError::NotFound)
        ));
    }

    #[test]
    fn test_insert_new_measurements_skips_duplicates() {
        let repo = Repository::default();
        let first = measurement("Austin", Parameter::Pm25, 1, 12.0);
        repo.insert_measurements(&[first.clone()]).unwrap();

        let mut refetched = first.clone();
        refetched.value = 13.0;
        let fresh = measurement("Austin", Parameter::Pm25, 0, 14.0);
        let written = repo.insert_new_measurements(&[refetched, fresh]).unwrap();
        assert_eq!(written, 1);
        assert_eq!(repo.measurement_count(), 2);
    }

    #[test]
    fn test_retention_limit() {
        let repo = Repository::new(StorageConfig {
            max_measurements: 5,
            ..Default::default()
        });
        let batch: Vec<_> = (0..10)
            .map(|h| measurement("Austin", Parameter::O3, h, 1.0))
            .collect();
        repo.insert_measurements(&batch).unwrap();
        assert_eq!(repo.measurement_count(), 5);
    }

    #[test]
    fn test_observation_index_follows_eviction() {
        let repo = Repository::new(StorageConfig {
            max_measurements: 3,
            ..Default::default()
        });
        let oldest = measurement("Austin", Parameter::No2, 10, 1.0);
        repo.insert_measurements(&[oldest.clone(), oldest.clone()]).unwrap();
        assert_eq!(repo.insert_new_measurements(&[oldest.clone()]).unwrap(), 0);

        // one copy evicted, the other still indexed
        repo.insert_measurements(&[measurement("Austin", Parameter::No2, 1, 2.0)])
            .unwrap();
        repo.insert_measurements(&[measurement("Austin", Parameter::No2, 2, 2.0)])
            .unwrap();
        assert_eq!(repo.insert_new_measurements(&[oldest.clone()]).unwrap(), 0);

        // both copies evicted
        repo.insert_measurements(&[measurement("Austin", Parameter::No2, 3, 2.0)])
            .unwrap();
        assert_eq!(repo.insert_new_measurements(&[oldest]).unwrap(), 1);
        assert_eq!(repo.measurement_count(), 3);
    }

    #[test]
    fn test_forecast_record_serializes_tier() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let record = ForecastRecord {
            id: 1,
            batch_id: Uuid::nil(),
            tier: Tier::Trend,
            point: ForecastPoint::with_half_width("Austin", Parameter::O3, now, 1.0, 0.5),
            created_at: now,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["tier"], "trend");
        assert_eq!(json["point"]["parameter"], "O3");
    }
}
