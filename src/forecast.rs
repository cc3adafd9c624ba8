//! Next-hour PM2.5 prediction from the latest persisted reading.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::enrich::EnrichedReading;
use crate::model::{ModelError, Regressor};
use crate::schema::{feature_vector, FEATURE_COLUMNS};

/// Past row where both the observation and the model's one-step-back
/// prediction are known. Derived for history display, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub ts_s_utc: i64,
    pub actual_pm25: f64,
    pub predicted_pm25: f64,
}

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("reading at {ts_s_utc} has a non-finite value for {column}")]
    FeatureMismatch { ts_s_utc: i64, column: &'static str },
    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

/// Predicts the next hour's pm25 from the latest enriched reading.
///
/// The feature vector is assembled in the exact column order used at training
/// time. A reading with a non-finite measurement (NaN from a degraded sensor)
/// is rejected, and model failures surface synchronously; nothing is
/// defaulted or retried here.
pub fn predict_next_hour(
    latest: &EnrichedReading,
    model: &dyn Regressor,
) -> Result<f64, ForecastError> {
    let features = checked_feature_vector(latest)?;
    let predicted = model.predict(&features)?;

    info!(
        component = "forecast",
        event = "forecast.predict.finish",
        ts_s_utc = latest.reading.ts_s_utc,
        predicted_pm25 = predicted
    );

    Ok(predicted)
}

/// Builds the last `n` prediction records from an ordered history: the row at
/// position *i* is predicted from the row at *i − 1* and compared against its
/// observed pm25. Rows whose predecessor is unusable are skipped.
pub fn prediction_history(
    readings: &[EnrichedReading],
    model: &dyn Regressor,
    n: usize,
) -> Vec<PredictionRecord> {
    let mut out = Vec::new();

    for pair in readings.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        let Ok(features) = checked_feature_vector(previous) else {
            continue;
        };
        let Ok(predicted) = model.predict(&features) else {
            continue;
        };

        out.push(PredictionRecord {
            ts_s_utc: current.reading.ts_s_utc,
            actual_pm25: current.reading.pm25,
            predicted_pm25: predicted,
        });
    }

    let keep_from = out.len().saturating_sub(n);
    out.split_off(keep_from)
}

fn checked_feature_vector(enriched: &EnrichedReading) -> Result<Vec<f64>, ForecastError> {
    let features = feature_vector(enriched);
    for (value, column) in features.iter().zip(FEATURE_COLUMNS) {
        if !value.is_finite() {
            return Err(ForecastError::FeatureMismatch {
                ts_s_utc: enriched.reading.ts_s_utc,
                column,
            });
        }
    }
    Ok(features)
}
