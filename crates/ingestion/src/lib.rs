//! Measurement Ingestion
//!
//! Pulls raw records from upstream sources, cleans them, and persists each
//! source's batch in its own unit of work. One source failing never stops
//! the others.

mod manager;
mod source;

pub use manager::{IngestionManager, IngestionSummary, SourceResult};
pub use source::{
    parse_records, DataSource, FetchRequest, JsonFileSource, RecordedSource, SourceKind,
};

use storage::StorageError;
use thiserror::Error;

/// Ingestion error types
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("{source_kind} fetch failed: {message}")]
    Fetch {
        source_kind: SourceKind,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
