//! Batch Measurement Cleaning
//!
//! Each raw record is checked independently; a bad record is dropped and
//! never aborts the batch.

use crate::error::RejectReason;
use crate::normalizer::UnitNormalizer;
use crate::validator::{ValidationConfig, Validator};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use measurement::{Measurement, Parameter, RawMeasurement, RawTimestamp, RawValue};
use metrics::counter;
use tracing::{debug, info};

/// Outcome of cleaning a batch
#[derive(Debug, Clone, Default)]
pub struct CleaningReport {
    /// Surviving records, in input order
    pub measurements: Vec<Measurement>,
    /// Number of input records
    pub total: usize,
    /// Dropped input positions and why
    pub rejected: Vec<(usize, RejectReason)>,
}

impl CleaningReport {
    /// Number of records kept
    pub fn cleaned(&self) -> usize {
        self.measurements.len()
    }
}

/// Validates, normalizes, and filters raw measurement batches
pub struct MeasurementCleaner {
    normalizer: UnitNormalizer,
    validator: Validator,
}

impl MeasurementCleaner {
    /// Create a new cleaner with given validation config
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            normalizer: UnitNormalizer::new(),
            validator: Validator::new(config),
        }
    }

    /// Clean a batch against the current wall clock
    pub fn clean(&self, batch: &[RawMeasurement]) -> Vec<Measurement> {
        self.clean_at(batch, Utc::now()).measurements
    }

    /// Clean a batch against an explicit reference time
    pub fn clean_at(&self, batch: &[RawMeasurement], now: DateTime<Utc>) -> CleaningReport {
        let mut report = CleaningReport {
            measurements: Vec::with_capacity(batch.len()),
            total: batch.len(),
            rejected: Vec::new(),
        };

        for (index, raw) in batch.iter().enumerate() {
            match self.clean_one(raw, now) {
                Ok(measurement) => report.measurements.push(measurement),
                Err(reason) => {
                    debug!("Dropping measurement {}: {}", index, reason);
                    counter!("measurements_dropped_total", "reason" => reason.label()).increment(1);
                    report.rejected.push((index, reason));
                }
            }
        }

        counter!("measurements_received_total").increment(report.total as u64);
        counter!("measurements_cleaned_total").increment(report.cleaned() as u64);
        info!(
            "Cleaned {} out of {} measurements",
            report.cleaned(),
            report.total
        );

        report
    }

    /// Clean a single record
    pub fn clean_one(
        &self,
        raw: &RawMeasurement,
        now: DateTime<Utc>,
    ) -> Result<Measurement, RejectReason> {
        let city = required_text(&raw.city, "city")?;
        let parameter = required_text(&raw.parameter, "parameter")?;
        let unit = required_text(&raw.unit, "unit")?;
        let value = raw.value.as_ref().ok_or(RejectReason::MissingField("value"))?;
        let date_utc = raw
            .date_utc
            .as_ref()
            .ok_or(RejectReason::MissingField("date_utc"))?;

        let value = coerce_value(value)?;
        let date_utc = parse_timestamp(date_utc)?;
        self.validator.validate_timestamp(date_utc, now)?;

        let parameter = Parameter::normalize_name(parameter);
        let normalized = self.normalizer.normalize(value, unit, &parameter)?;
        if !normalized.canonical {
            return Err(RejectReason::NonCanonicalUnit(normalized.unit));
        }
        self.validator.validate_value(&parameter, normalized.value)?;

        let source = raw
            .source
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown");

        Ok(Measurement {
            city: city.to_string(),
            parameter,
            value: normalized.value,
            unit: normalized.unit,
            date_utc,
            source: source.to_string(),
            is_outlier: None,
            original: Some(raw.clone()),
        })
    }
}

impl Default for MeasurementCleaner {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

fn required_text<'a>(
    field: &'a Option<String>,
    name: &'static str,
) -> Result<&'a str, RejectReason> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(RejectReason::MissingField(name))
}

fn coerce_value(value: &RawValue) -> Result<f64, RejectReason> {
    let parsed = match value {
        RawValue::Number(n) => *n,
        RawValue::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| RejectReason::InvalidValue(text.clone()))?,
    };
    if parsed.is_finite() {
        Ok(parsed)
    } else {
        Err(RejectReason::InvalidValue(parsed.to_string()))
    }
}

/// Parse an ISO-8601 timestamp. Offsets are honoured and converted to UTC;
/// naive timestamps are taken as UTC.
pub fn parse_timestamp(raw: &RawTimestamp) -> Result<DateTime<Utc>, RejectReason> {
    let text = match raw {
        RawTimestamp::Parsed(ts) => return Ok(*ts),
        RawTimestamp::Text(text) => text.trim(),
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }

    let naive = text.strip_suffix('Z').unwrap_or(text);
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(naive, format) {
            return Ok(ts.and_utc());
        }
    }

    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
        .ok_or_else(|| RejectReason::InvalidTimestamp(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use measurement::CANONICAL_UNIT;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    fn raw(parameter: &str, value: impl Into<RawValue>, unit: &str) -> RawMeasurement {
        RawMeasurement::new(
            "Austin",
            parameter,
            value,
            unit,
            "2024-01-01T00:00:00Z",
            "openaq",
        )
    }

    #[test]
    fn test_end_to_end_example() {
        let cleaner = MeasurementCleaner::default();
        let input = vec![raw("pm25", "12.5", "µg/m³")];

        let report = cleaner.clean_at(&input, now());
        assert_eq!(report.cleaned(), 1);

        let m = &report.measurements[0];
        assert_eq!(m.city, "Austin");
        assert_eq!(m.parameter, "PM2.5");
        assert_eq!(m.value, 12.5);
        assert_eq!(m.unit, CANONICAL_UNIT);
        assert_eq!(m.date_utc, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(m.source, "openaq");
        assert_eq!(m.original.as_ref(), Some(&input[0]));
    }

    #[test]
    fn test_missing_fields_dropped() {
        let cleaner = MeasurementCleaner::default();
        let mut no_city = raw("pm25", 10.0, "µg/m³");
        no_city.city = Some("   ".to_string());
        let mut no_value = raw("pm25", 10.0, "µg/m³");
        no_value.value = None;
        let mut no_date = raw("pm25", 10.0, "µg/m³");
        no_date.date_utc = None;

        let report = cleaner.clean_at(&[no_city, no_value, no_date], now());
        assert_eq!(report.cleaned(), 0);
        assert_eq!(
            report.rejected[0].1,
            RejectReason::MissingField("city")
        );
        assert_eq!(
            report.rejected[1].1,
            RejectReason::MissingField("value")
        );
    }

    #[test]
    fn test_non_numeric_value_dropped() {
        let cleaner = MeasurementCleaner::default();
        let report = cleaner.clean_at(&[raw("o3", "n/a", "ppb")], now());
        assert!(matches!(report.rejected[0].1, RejectReason::InvalidValue(_)));
    }

    #[test]
    fn test_unparseable_date_dropped() {
        let cleaner = MeasurementCleaner::default();
        let mut record = raw("o3", 10.0, "µg/m³");
        record.date_utc = Some(RawTimestamp::Text("yesterday".to_string()));
        let report = cleaner.clean_at(&[record], now());
        assert!(matches!(
            report.rejected[0].1,
            RejectReason::InvalidTimestamp(_)
        ));
    }

    #[test]
    fn test_stale_record_dropped() {
        let cleaner = MeasurementCleaner::default();
        let mut record = raw("no2", 10.0, "µg/m³");
        record.date_utc = Some(RawTimestamp::Parsed(now() - Duration::days(366)));
        let report = cleaner.clean_at(&[record], now());
        assert_eq!(report.cleaned(), 0);
        assert!(matches!(report.rejected[0].1, RejectReason::OutsideWindow(_)));
    }

    #[test]
    fn test_ppb_conversion_then_range_check() {
        let cleaner = MeasurementCleaner::default();
        // 5 ppb NO2 -> 230 µg/m³ (kept), 50 ppb O3 -> 2400 µg/m³ (rejected)
        let report = cleaner.clean_at(&[raw("no2", 5.0, "ppb"), raw("ozone", 50.0, "ppb")], now());
        assert_eq!(report.cleaned(), 1);
        assert_eq!(report.measurements[0].value, 230.0);
        assert!(matches!(report.rejected[0].1, RejectReason::OutOfRange { .. }));
        assert_eq!(report.rejected[0].0, 1);
    }

    #[test]
    fn test_unknown_unit_dropped() {
        let cleaner = MeasurementCleaner::default();
        let report = cleaner.clean_at(&[raw("no2", 3.0e15, "mol/m²")], now());
        assert!(matches!(
            report.rejected[0].1,
            RejectReason::NonCanonicalUnit(_)
        ));
    }

    #[test]
    fn test_unknown_parameter_passes_unvalidated() {
        let cleaner = MeasurementCleaner::default();
        let report = cleaner.clean_at(&[raw("so2", 9000.0, "ug/m3")], now());
        assert_eq!(report.cleaned(), 1);
        assert_eq!(report.measurements[0].parameter, "SO2");
    }

    #[test]
    fn test_output_preserves_input_order() {
        let cleaner = MeasurementCleaner::default();
        let batch = vec![
            raw("pm25", 1.0, "µg/m³"),
            raw("pm25", "bad", "µg/m³"),
            raw("pm25", 2.0, "µg/m³"),
            raw("pm25", 3.0, "µg/m³"),
        ];
        let values: Vec<f64> = cleaner
            .clean_at(&batch, now())
            .measurements
            .iter()
            .map(|m| m.value)
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_missing_source_defaults_to_unknown() {
        let cleaner = MeasurementCleaner::default();
        let mut record = raw("pm25", 4.0, "µg/m³");
        record.source = None;
        let report = cleaner.clean_at(&[record], now());
        assert_eq!(report.measurements[0].source, "unknown");
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
        for text in [
            "2024-01-01T06:00:00Z",
            "2024-01-01T06:00:00",
            "2024-01-01T06:00:00.000",
            "2024-01-01 06:00:00",
            "2024-01-01T01:00:00-05:00",
        ] {
            let parsed = parse_timestamp(&RawTimestamp::Text(text.to_string())).unwrap();
            assert_eq!(parsed, expected, "{}", text);
        }
    }

    fn arb_raw() -> impl Strategy<Value = RawMeasurement> {
        (
            prop::sample::select(vec!["pm25", "o3", "NO2", "hcho", "so2", ""]),
            -100.0..1000.0_f64,
            prop::sample::select(vec!["µg/m³", "ppb", "ppm", "mg/m3", "furlongs"]),
            0i64..800,
        )
            .prop_map(|(param, value, unit, age_days)| {
                let ts = now() - Duration::days(age_days);
                RawMeasurement::new("Austin", param, value, unit, ts, "test")
            })
    }

    proptest! {
        #[test]
        fn prop_cleaning_never_grows_batch(batch in prop::collection::vec(arb_raw(), 0..40)) {
            let cleaner = MeasurementCleaner::default();
            let report = cleaner.clean_at(&batch, now());
            prop_assert!(report.cleaned() <= batch.len());
            prop_assert_eq!(report.cleaned() + report.rejected.len(), batch.len());
        }

        #[test]
        fn prop_pm25_always_in_range(batch in prop::collection::vec(arb_raw(), 0..40)) {
            let cleaner = MeasurementCleaner::default();
            for m in cleaner.clean_at(&batch, now()).measurements {
                prop_assert_eq!(m.unit.as_str(), CANONICAL_UNIT);
                if m.parameter == "PM2.5" {
                    prop_assert!((0.0..=500.0).contains(&m.value));
                }
            }
        }
    }
}
