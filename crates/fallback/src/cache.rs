//! Prediction Cache
//!
//! Entries are keyed by the absolute UTC hour they were created in, so a
//! read in any later hour is a structural miss. Stale buckets are pruned on
//! write.

use chrono::{DateTime, Utc};
use measurement::Parameter;
use metrics::counter;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Cache key for one forecast request within one hour
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub city: String,
    pub parameter: Parameter,
    pub hours_ahead: usize,
    /// Hours since the Unix epoch
    pub hour_bucket: i64,
}

impl CacheKey {
    pub fn new(city: &str, parameter: Parameter, hours_ahead: usize, now: DateTime<Utc>) -> Self {
        Self {
            city: city.to_string(),
            parameter,
            hours_ahead,
            hour_bucket: hour_bucket(now),
        }
    }
}

fn hour_bucket(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(3600)
}

/// In-process memo of forecast payloads, valid for the current hour only
pub struct PredictionCache<T> {
    entries: Mutex<HashMap<CacheKey, T>>,
}

impl<T: Clone> PredictionCache<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a payload created in the current hour
    pub fn get(&self, city: &str, parameter: Parameter, hours_ahead: usize) -> Option<T> {
        self.get_at(city, parameter, hours_ahead, Utc::now())
    }

    /// Look up a payload created in the hour containing `now`
    pub fn get_at(
        &self,
        city: &str,
        parameter: Parameter,
        hours_ahead: usize,
        now: DateTime<Utc>,
    ) -> Option<T> {
        let key = CacheKey::new(city, parameter, hours_ahead, now);
        let hit = match self.entries.lock() {
            Ok(entries) => entries.get(&key).cloned(),
            Err(e) => {
                warn!("Prediction cache lock error: {}", e);
                None
            }
        };

        if hit.is_some() {
            counter!("prediction_cache_hits_total").increment(1);
            debug!("Cache hit for {} - {} ({}h)", city, parameter, hours_ahead);
        } else {
            counter!("prediction_cache_misses_total").increment(1);
        }
        hit
    }

    /// Store a payload for the current hour
    pub fn put(&self, city: &str, parameter: Parameter, hours_ahead: usize, payload: T) {
        self.put_at(city, parameter, hours_ahead, payload, Utc::now())
    }

    /// Store a payload for the hour containing `now`; last write wins
    pub fn put_at(
        &self,
        city: &str,
        parameter: Parameter,
        hours_ahead: usize,
        payload: T,
        now: DateTime<Utc>,
    ) {
        let key = CacheKey::new(city, parameter, hours_ahead, now);
        match self.entries.lock() {
            Ok(mut entries) => {
                let current = key.hour_bucket;
                entries.retain(|k, _| k.hour_bucket == current);
                entries.insert(key, payload);
            }
            Err(e) => warn!("Prediction cache lock error: {}", e),
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for PredictionCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
