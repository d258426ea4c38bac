//! Historical Query Seam

use crate::StorageError;
use chrono::{DateTime, Utc};
use measurement::{Measurement, Parameter};

/// Read access to stored measurements for one city and parameter
pub trait HistoryStore: Send + Sync {
    /// Measurements at or after `since`, most recent first, at most `limit`
    fn recent(
        &self,
        city: &str,
        parameter: Parameter,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Measurement>, StorageError>;

    /// Measurements within `[start, end]`, oldest first
    fn range(
        &self,
        city: &str,
        parameter: Parameter,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Measurement>, StorageError>;
}
