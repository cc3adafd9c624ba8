//! Training-time dataset construction with a strictly time-ordered split.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::enrich::EnrichedReading;
use crate::schema::feature_vector;

const HOUR_S: i64 = 3_600;

/// How to label a row whose successor is not exactly one hour later.
///
/// The sensor feed occasionally misses an hour. `UseAdjacent` labels with the
/// next persisted row regardless of the gap (the historical behavior of this
/// pipeline); `SkipNonHourly` drops those pairs and reports them, since a
/// label taken hours later is not a next-hour target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelGapPolicy {
    UseAdjacent,
    SkipNonHourly,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Fraction of examples assigned to the training set, in (0, 1).
    /// Deliberately has no default: the caller decides the split.
    pub split_fraction: f64,
    pub gap_policy: LabelGapPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    /// Timestamp of the feature row, kept for split auditing.
    pub ts_s_utc: i64,
    pub features: Vec<f64>,
    pub label: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSplit {
    pub train: Vec<TrainingExample>,
    pub test: Vec<TrainingExample>,
    pub report: DatasetReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetReport {
    pub input_rows: u64,
    pub examples: u64,
    pub skipped_gap_pairs: u64,
    pub train_rows: u64,
    pub test_rows: u64,
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("empty series: need at least 2 readings to form a (feature, label) pair, got {0}")]
    EmptySeries(usize),
    #[error("invalid split fraction {0}: must be strictly between 0 and 1")]
    InvalidSplitFraction(f64),
    #[error("readings are not strictly ascending at index {index}: {prev_ts} >= {ts}")]
    UnorderedSeries { index: usize, prev_ts: i64, ts: i64 },
}

/// Builds the supervised dataset: features of row *i* paired with the pm25 of
/// row *i+1*, the final row dropped, then split chronologically at
/// `split_fraction`. Never shuffles; every test example is strictly later
/// than every train example.
pub fn build_dataset(
    readings: &[EnrichedReading],
    cfg: &DatasetConfig,
) -> Result<DatasetSplit, DatasetError> {
    if !(cfg.split_fraction > 0.0 && cfg.split_fraction < 1.0) {
        return Err(DatasetError::InvalidSplitFraction(cfg.split_fraction));
    }
    if readings.len() < 2 {
        return Err(DatasetError::EmptySeries(readings.len()));
    }
    assert_strictly_ascending(readings)?;

    let mut examples = Vec::with_capacity(readings.len() - 1);
    let mut skipped_gap_pairs = 0u64;

    for pair in readings.windows(2) {
        let (current, next) = (&pair[0], &pair[1]);
        let gap = next.reading.ts_s_utc - current.reading.ts_s_utc;

        if gap != HOUR_S && cfg.gap_policy == LabelGapPolicy::SkipNonHourly {
            warn!(
                component = "dataset",
                event = "dataset.gap_pair.skipped",
                ts_s_utc = current.reading.ts_s_utc,
                gap_s = gap
            );
            skipped_gap_pairs += 1;
            continue;
        }

        examples.push(TrainingExample {
            ts_s_utc: current.reading.ts_s_utc,
            features: feature_vector(current),
            label: next.reading.pm25,
        });
    }

    let train_len = (examples.len() as f64 * cfg.split_fraction).floor() as usize;
    let test = examples.split_off(train_len);
    let train = examples;

    let report = DatasetReport {
        input_rows: readings.len() as u64,
        examples: (train.len() + test.len()) as u64,
        skipped_gap_pairs,
        train_rows: train.len() as u64,
        test_rows: test.len() as u64,
    };

    info!(
        component = "dataset",
        event = "dataset.build.finish",
        input_rows = report.input_rows,
        examples = report.examples,
        skipped_gap_pairs = report.skipped_gap_pairs,
        train_rows = report.train_rows,
        test_rows = report.test_rows
    );

    Ok(DatasetSplit {
        train,
        test,
        report,
    })
}

fn assert_strictly_ascending(readings: &[EnrichedReading]) -> Result<(), DatasetError> {
    for (index, pair) in readings.windows(2).enumerate() {
        let prev_ts = pair[0].reading.ts_s_utc;
        let ts = pair[1].reading.ts_s_utc;
        if prev_ts >= ts {
            return Err(DatasetError::UnorderedSeries {
                index: index + 1,
                prev_ts,
                ts,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::{enrich, Reading};

    const START_TS: i64 = 1_735_689_600; // 2025-01-01T00:00:00Z

    fn hourly_series(n: usize) -> Vec<EnrichedReading> {
        (0..n)
            .map(|i| {
                enrich(&Reading {
                    ts_s_utc: START_TS + i as i64 * HOUR_S,
                    pm1: i as f64,
                    pm25: 10.0 + i as f64,
                    pm03: 100.0,
                    relative_humidity: 50.0,
                    temperature: 20.0,
                })
                .unwrap()
            })
            .collect()
    }

    fn cfg(split_fraction: f64) -> DatasetConfig {
        DatasetConfig {
            split_fraction,
            gap_policy: LabelGapPolicy::UseAdjacent,
        }
    }

    #[test]
    fn labels_are_one_step_ahead_and_final_row_is_dropped() {
        let readings = hourly_series(5);
        let split = build_dataset(&readings, &cfg(0.99)).unwrap();

        let all: Vec<&TrainingExample> = split.train.iter().chain(split.test.iter()).collect();
        assert_eq!(all.len(), 4);
        for (i, example) in all.iter().enumerate() {
            assert_eq!(example.label, readings[i + 1].reading.pm25);
            assert_eq!(example.features[0], readings[i].reading.pm1);
        }
    }

    #[test]
    fn split_is_chronological_with_no_temporal_leak() {
        let readings = hourly_series(11);
        let split = build_dataset(&readings, &cfg(0.7)).unwrap();

        assert_eq!(split.train.len(), 7);
        assert_eq!(split.test.len(), 3);

        let max_train_ts = split.train.iter().map(|e| e.ts_s_utc).max().unwrap();
        let min_test_ts = split.test.iter().map(|e| e.ts_s_utc).min().unwrap();
        assert!(min_test_ts > max_train_ts);
    }

    #[test]
    fn single_reading_is_an_empty_series() {
        let readings = hourly_series(1);
        let err = build_dataset(&readings, &cfg(0.8)).unwrap_err();
        assert!(matches!(err, DatasetError::EmptySeries(1)));
    }

    #[test]
    fn split_fraction_must_be_supplied_in_open_interval() {
        let readings = hourly_series(5);
        for bad in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            let err = build_dataset(&readings, &cfg(bad)).unwrap_err();
            assert!(matches!(err, DatasetError::InvalidSplitFraction(_)));
        }
    }

    #[test]
    fn gap_policy_skips_non_hourly_pairs_and_reports_them() {
        let mut readings = hourly_series(5);
        // Remove the 02:00 row: 01:00 -> 03:00 is now a two-hour jump.
        readings.remove(2);

        let adjacent = build_dataset(
            &readings,
            &DatasetConfig {
                split_fraction: 0.99,
                gap_policy: LabelGapPolicy::UseAdjacent,
            },
        )
        .unwrap();
        assert_eq!(adjacent.report.examples, 3);
        assert_eq!(adjacent.report.skipped_gap_pairs, 0);
        // The historical behavior: the gapped pair is silently labeled.
        assert_eq!(adjacent.train[1].label, 13.0);

        let strict = build_dataset(
            &readings,
            &DatasetConfig {
                split_fraction: 0.99,
                gap_policy: LabelGapPolicy::SkipNonHourly,
            },
        )
        .unwrap();
        assert_eq!(strict.report.examples, 2);
        assert_eq!(strict.report.skipped_gap_pairs, 1);
    }

    #[test]
    fn unordered_input_is_rejected() {
        let mut readings = hourly_series(3);
        readings.swap(0, 1);
        let err = build_dataset(&readings, &cfg(0.5)).unwrap_err();
        assert!(matches!(err, DatasetError::UnorderedSeries { .. }));
    }
}
