//! Time-Bucket Aggregation

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use measurement::Measurement;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregation period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Hourly,
    Daily,
}

impl Aggregation {
    fn bucket(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let step = match self {
            Aggregation::Hourly => TimeDelta::hours(1),
            Aggregation::Daily => TimeDelta::days(1),
        };
        ts.duration_trunc(step).unwrap_or(ts)
    }
}

struct Bucket {
    sum: f64,
    count: usize,
    unit: String,
    source: String,
}

/// Average measurements per `(city, parameter, period)`.
///
/// The first record seen in a bucket supplies its unit and source. Output is
/// sorted by city, parameter, then bucket start.
pub fn aggregate(batch: &[Measurement], period: Aggregation) -> Vec<Measurement> {
    let mut buckets: BTreeMap<(String, String, DateTime<Utc>), Bucket> = BTreeMap::new();

    for m in batch {
        let key = (m.city.clone(), m.parameter.clone(), period.bucket(m.date_utc));
        let bucket = buckets.entry(key).or_insert_with(|| Bucket {
            sum: 0.0,
            count: 0,
            unit: m.unit.clone(),
            source: m.source.clone(),
        });
        bucket.sum += m.value;
        bucket.count += 1;
    }

    buckets
        .into_iter()
        .map(|((city, parameter, date_utc), bucket)| Measurement {
            city,
            parameter,
            value: bucket.sum / bucket.count as f64,
            unit: bucket.unit,
            date_utc,
            source: bucket.source,
            is_outlier: None,
            original: None,
        })
        .collect()
}
