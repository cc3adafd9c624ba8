//! IQR outlier bounds and filtering, per measurement column.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::enrich::Reading;

const IQR_MULTIPLIER: f64 = 1.5;
const MIN_SAMPLE_SIZE: usize = 4;

/// Measurement columns a bound can be computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadingColumn {
    Pm1,
    Pm25,
    Pm03,
    RelativeHumidity,
    Temperature,
}

impl ReadingColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pm1 => "pm1",
            Self::Pm25 => "pm25",
            Self::Pm03 => "pm03",
            Self::RelativeHumidity => "relative_humidity",
            Self::Temperature => "temperature",
        }
    }

    pub fn value_of(self, reading: &Reading) -> f64 {
        match self {
            Self::Pm1 => reading.pm1,
            Self::Pm25 => reading.pm25,
            Self::Pm03 => reading.pm03,
            Self::RelativeHumidity => reading.relative_humidity,
            Self::Temperature => reading.temperature,
        }
    }
}

pub const ALL_COLUMNS: [ReadingColumn; 5] = [
    ReadingColumn::Pm1,
    ReadingColumn::Pm25,
    ReadingColumn::Pm03,
    ReadingColumn::RelativeHumidity,
    ReadingColumn::Temperature,
];

/// Per-column `(Q1 - 1.5*IQR, Q3 + 1.5*IQR)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierBounds {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Error)]
pub enum OutlierError {
    #[error("insufficient data for {column} quartiles: {observed} observations, need {required}")]
    InsufficientData {
        column: &'static str,
        observed: usize,
        required: usize,
    },
}

/// Computes IQR bounds over a reference sample using linear-interpolation
/// quantiles. Fails when fewer than 4 observations are supplied.
pub fn compute_bounds(
    readings: &[Reading],
    column: ReadingColumn,
) -> Result<OutlierBounds, OutlierError> {
    if readings.len() < MIN_SAMPLE_SIZE {
        return Err(OutlierError::InsufficientData {
            column: column.as_str(),
            observed: readings.len(),
            required: MIN_SAMPLE_SIZE,
        });
    }

    let mut values: Vec<f64> = readings.iter().map(|r| column.value_of(r)).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let q1 = quantile_sorted(&values, 0.25);
    let q3 = quantile_sorted(&values, 0.75);
    let iqr = q3 - q1;

    Ok(OutlierBounds {
        lower: q1 - IQR_MULTIPLIER * iqr,
        upper: q3 + IQR_MULTIPLIER * iqr,
    })
}

/// Drops readings whose column value falls outside `[lower, upper]`.
/// Input is left untouched.
pub fn filter_outliers(
    readings: &[Reading],
    column: ReadingColumn,
    bounds: &OutlierBounds,
) -> Vec<Reading> {
    let filtered: Vec<Reading> = readings
        .iter()
        .filter(|reading| {
            let value = column.value_of(reading);
            value >= bounds.lower && value <= bounds.upper
        })
        .copied()
        .collect();

    if filtered.len() < readings.len() {
        info!(
            component = "outliers",
            event = "outliers.filtered",
            column = column.as_str(),
            input_rows = readings.len(),
            dropped_rows = readings.len() - filtered.len(),
            lower = bounds.lower,
            upper = bounds.upper
        );
    }

    filtered
}

/// Point-in-time bounds snapshot for the known columns, computed once over a
/// long reference window of this sensor set. Cheap to consult at serving time
/// but never refreshed: callers must not assume these track distribution
/// drift, and should recompute via [`compute_bounds`] when retraining.
pub fn precomputed_bounds(column: ReadingColumn) -> OutlierBounds {
    match column {
        ReadingColumn::Pm1 => OutlierBounds {
            lower: -7.54,
            upper: 20.36,
        },
        ReadingColumn::Pm25 => OutlierBounds {
            lower: -12.93,
            upper: 34.52,
        },
        ReadingColumn::Pm03 => OutlierBounds {
            lower: -1208.5,
            upper: 3382.1,
        },
        ReadingColumn::RelativeHumidity => OutlierBounds {
            lower: 6.25,
            upper: 91.45,
        },
        ReadingColumn::Temperature => OutlierBounds {
            lower: 2.18,
            upper: 39.74,
        },
    }
}

// Linear interpolation between closest ranks, matching the default quantile
// method of the tooling the reference bounds were produced with.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    let position = q * (n - 1) as f64;
    let lower_idx = position.floor() as usize;
    let upper_idx = position.ceil() as usize;

    if lower_idx == upper_idx {
        return sorted[lower_idx];
    }

    let weight = position - lower_idx as f64;
    sorted[lower_idx] * (1.0 - weight) + sorted[upper_idx] * weight
}
