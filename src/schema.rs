//! The single feature schema shared by training and serving.
//!
//! Dataset construction and next-hour prediction both assemble their vectors
//! through this module, so the column order cannot drift between the two.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::enrich::EnrichedReading;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Column order fixed at training time.
pub const FEATURE_COLUMNS: [&str; 7] = [
    "pm1",
    "relative_humidity",
    "temperature",
    "pm03",
    "hour",
    "day_of_week",
    "month",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch { expected: String, actual: String },
}

pub fn feature_schema() -> FeatureSchema {
    let columns: Vec<String> = FEATURE_COLUMNS.iter().map(|c| (*c).to_string()).collect();
    let fingerprint = schema_fingerprint(&columns);

    FeatureSchema {
        version: FEATURE_SCHEMA_VERSION,
        fingerprint,
        columns,
    }
}

/// Assembles the model input for one enriched reading, in schema column
/// order. Finiteness is not checked here; the forecaster owns that gate.
pub fn feature_vector(enriched: &EnrichedReading) -> Vec<f64> {
    vec![
        enriched.reading.pm1,
        enriched.reading.relative_humidity,
        enriched.reading.temperature,
        enriched.reading.pm03,
        f64::from(enriched.hour),
        f64::from(enriched.day_of_week),
        f64::from(enriched.month),
    ]
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), SchemaError> {
    if expected_version != actual.version {
        return Err(SchemaError::VersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(SchemaError::FingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

fn schema_fingerprint(columns: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{FEATURE_SCHEMA_VERSION};columns:"));
    for column in columns {
        hasher.update(column.as_bytes());
        hasher.update(":f64;");
    }
    hex::encode(hasher.finalize())
}
