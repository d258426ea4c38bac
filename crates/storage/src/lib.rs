//! Storage Layer
//!
//! Historical measurements and forecast audit records behind a repository,
//! with unit-of-work batches and a read-only query seam for forecasting.

mod history;
mod repository;
mod unit_of_work;

pub use history::HistoryStore;
pub use repository::{
    ForecastRecord, MeasurementQuery, Repository, StorageConfig, DEFAULT_QUERY_LIMIT,
    MAX_QUERY_LIMIT,
};
pub use unit_of_work::{CommitSummary, UnitOfWork};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}
