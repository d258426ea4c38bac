//! Ingestion Manager

use crate::source::{DataSource, FetchRequest, SourceKind};
use crate::IngestionError;
use chrono::{DateTime, Utc};
use data_validator::MeasurementCleaner;
use measurement::RawMeasurement;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use storage::Repository;
use tracing::{debug, info, warn};

/// Outcome for one source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    pub success: bool,
    /// Records written to the store
    pub records: usize,
    pub error: Option<String>,
}

/// Outcome of one ingestion run across all sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub total_records: usize,
    pub results: BTreeMap<SourceKind, SourceResult>,
    pub timestamp: DateTime<Utc>,
}

/// Fetches, cleans, and persists measurements from every registered source
pub struct IngestionManager {
    sources: Vec<Box<dyn DataSource>>,
    cleaner: MeasurementCleaner,
    repository: Arc<Repository>,
}

impl IngestionManager {
    /// Create a manager with no sources
    pub fn new(cleaner: MeasurementCleaner, repository: Arc<Repository>) -> Self {
        Self {
            sources: Vec::new(),
            cleaner,
            repository,
        }
    }

    /// Register a source
    pub fn with_source(mut self, source: impl DataSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Kinds of the registered sources, in registration order
    pub fn source_kinds(&self) -> Vec<SourceKind> {
        self.sources.iter().map(|s| s.kind()).collect()
    }

    /// Ingest from every source against the current wall clock
    pub fn ingest_all(&self, request: &FetchRequest) -> IngestionSummary {
        self.ingest_all_at(request, Utc::now())
    }

    /// Ingest from every source, validating timestamps against `now`
    pub fn ingest_all_at(&self, request: &FetchRequest, now: DateTime<Utc>) -> IngestionSummary {
        info!(
            "Starting data ingestion for last {} days from {} sources",
            request.days_back,
            self.sources.len()
        );

        let mut results = BTreeMap::new();
        for source in &self.sources {
            let kind = source.kind();
            let outcome = source.fetch(request).and_then(|mut raw| {
                let fetched = raw.len();
                raw.retain(|r| request.covers(r, now));
                if raw.len() < fetched {
                    debug!(
                        "Skipped {} {} records older than {} days",
                        fetched - raw.len(),
                        kind,
                        request.days_back
                    );
                }
                self.ingest_batch(kind, &raw, now)
            });

            // sources sharing a kind report jointly; any failure marks the kind failed
            let entry = results.entry(kind).or_insert_with(|| SourceResult {
                success: true,
                ..SourceResult::default()
            });
            match outcome {
                Ok(written) => entry.records += written,
                Err(e) => {
                    warn!("{} ingestion failed: {}", kind, e);
                    counter!("ingestion_source_failures_total", "source" => kind.as_str())
                        .increment(1);
                    entry.success = false;
                    entry.error = Some(e.to_string());
                }
            }
        }

        let total_records = results.values().map(|r| r.records).sum();
        info!("Data ingestion completed. Total records: {}", total_records);

        IngestionSummary {
            total_records,
            results,
            timestamp: now,
        }
    }

    /// Clean and persist one batch of raw records from `kind`
    ///
    /// Returns the number of records written.
    pub fn ingest_batch(
        &self,
        kind: SourceKind,
        raw: &[RawMeasurement],
        now: DateTime<Utc>,
    ) -> Result<usize, IngestionError> {
        let report = self.cleaner.clean_at(raw, now);
        let written = if kind.refetches_overlap() {
            self.repository.insert_new_measurements(&report.measurements)?
        } else {
            self.repository.insert_measurements(&report.measurements)?
        };
        info!(
            "Ingested {} of {} {} records",
            written,
            report.total,
            kind
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RecordedSource;
    use chrono::TimeZone;
    use data_validator::ValidationConfig;

    struct BrokenSource;

    impl DataSource for BrokenSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Tempo
        }

        fn fetch(&self, _request: &FetchRequest) -> Result<Vec<RawMeasurement>, IngestionError> {
            Err(IngestionError::Fetch {
                source_kind: SourceKind::Tempo,
                message: "authentication rejected".into(),
            })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    fn manager(repo: Arc<Repository>) -> IngestionManager {
        IngestionManager::new(MeasurementCleaner::new(ValidationConfig::default()), repo)
    }

    fn openaq_records() -> Vec<RawMeasurement> {
        vec![
            RawMeasurement::new("Austin", "pm25", "12.5", "µg/m³", "2024-01-01T00:00:00Z", "openaq"),
            RawMeasurement::new("Austin", "o3", 8.0, "ppb", "2024-01-01T01:00:00Z", "openaq"),
            // dropped: no unit
            RawMeasurement {
                unit: None,
                ..RawMeasurement::new("Austin", "no2", 5.0, "ppb", "2024-01-01T00:00:00Z", "openaq")
            },
        ]
    }

    fn airnow_records() -> Vec<RawMeasurement> {
        vec![
            RawMeasurement::new("Austin", "PM2.5", 9.0, "ug/m3", "2024-01-01T05:00:00Z", "airnow"),
            RawMeasurement::new("Austin", "PM2.5", 9.5, "ug/m3", "2024-01-01T06:00:00Z", "airnow"),
        ]
    }

    #[test]
    fn test_failed_source_does_not_abort_others() {
        let repo = Arc::new(Repository::default());
        let manager = manager(repo.clone())
            .with_source(BrokenSource)
            .with_source(RecordedSource::new(SourceKind::OpenAq, openaq_records()));

        let summary = manager.ingest_all_at(&FetchRequest::default(), now());
        assert_eq!(summary.total_records, 2);
        assert_eq!(repo.measurement_count(), 2);

        let tempo = &summary.results[&SourceKind::Tempo];
        assert!(!tempo.success);
        assert_eq!(tempo.records, 0);
        assert!(tempo.error.as_deref().unwrap_or("").contains("authentication"));

        let openaq = &summary.results[&SourceKind::OpenAq];
        assert!(openaq.success);
        assert_eq!(openaq.records, 2);
        assert_eq!(openaq.error, None);
    }

    #[test]
    fn test_airnow_refetch_skips_existing_rows() {
        let repo = Arc::new(Repository::default());
        let manager = manager(repo.clone())
            .with_source(RecordedSource::new(SourceKind::AirNow, airnow_records()));

        let first = manager.ingest_all_at(&FetchRequest::default(), now());
        let second = manager.ingest_all_at(&FetchRequest::default(), now());
        assert_eq!(first.total_records, 2);
        assert_eq!(second.total_records, 0);
        assert!(second.results[&SourceKind::AirNow].success);
        assert_eq!(repo.measurement_count(), 2);
    }

    #[test]
    fn test_ingest_batch_reports_written_count() {
        let repo = Arc::new(Repository::default());
        let manager = manager(repo.clone());
        let written = manager
            .ingest_batch(SourceKind::OpenAq, &openaq_records(), now())
            .unwrap();
        assert_eq!(written, 2);
        assert!(manager.source_kinds().is_empty());
    }

    #[test]
    fn test_days_back_limits_ingested_window() {
        let repo = Arc::new(Repository::default());
        let records = vec![
            RawMeasurement::new("Austin", "pm25", 8.0, "µg/m³", "2023-12-20T00:00:00Z", "openaq"),
            RawMeasurement::new("Austin", "pm25", 9.0, "µg/m³", "2024-01-01T12:00:00Z", "openaq"),
        ];
        let manager = manager(repo.clone())
            .with_source(RecordedSource::new(SourceKind::OpenAq, records));

        let request = FetchRequest {
            days_back: 1,
            ..FetchRequest::default()
        };
        let summary = manager.ingest_all_at(&request, now());
        assert_eq!(summary.total_records, 1);
        assert_eq!(repo.measurement_count(), 1);

        let wide = FetchRequest {
            days_back: 30,
            ..FetchRequest::default()
        };
        assert_eq!(manager.ingest_all_at(&wide, now()).total_records, 1);
        assert_eq!(repo.measurement_count(), 2);
    }

    #[test]
    fn test_same_kind_failure_is_not_masked() {
        let tempo_records = vec![RawMeasurement::new(
            "Austin", "no2", 4.0, "ppb", "2024-01-01T00:00:00Z", "tempo",
        )];

        for broken_first in [true, false] {
            let repo = Arc::new(Repository::default());
            let mut manager = manager(repo.clone());
            if broken_first {
                manager = manager
                    .with_source(BrokenSource)
                    .with_source(RecordedSource::new(SourceKind::Tempo, tempo_records.clone()));
            } else {
                manager = manager
                    .with_source(RecordedSource::new(SourceKind::Tempo, tempo_records.clone()))
                    .with_source(BrokenSource);
            }

            let summary = manager.ingest_all_at(&FetchRequest::default(), now());
            let tempo = &summary.results[&SourceKind::Tempo];
            assert!(!tempo.success);
            assert_eq!(tempo.records, 1);
            assert!(tempo.error.is_some());
        }
    }

    #[test]
    fn test_summary_serializes_source_keys() {
        let repo = Arc::new(Repository::default());
        let manager = manager(repo).with_source(BrokenSource);
        let summary = manager.ingest_all_at(&FetchRequest::default(), now());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["results"]["tempo"]["success"], false);
        assert_eq!(json["total_records"], 0);
    }
}
