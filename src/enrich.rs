//! Reading types and calendar feature derivation.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// One sensor observation epoch, timestamps in unix seconds UTC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub ts_s_utc: i64,
    pub pm1: f64,
    pub pm25: f64,
    pub pm03: f64,
    pub relative_humidity: f64,
    pub temperature: f64,
}

/// Boundary form of a reading as delivered by the sensor API or a CSV export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub timestamp: String,
    pub pm1: f64,
    pub pm25: f64,
    pub pm03: f64,
    pub relative_humidity: f64,
    pub temperature: f64,
}

/// Reading plus calendar fields derived from its timestamp.
///
/// Derivation is pure: the calendar fields are a function of `ts_s_utc`
/// alone, so re-enriching an already-enriched row is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnrichedReading {
    pub reading: Reading,
    pub hour: u32,
    pub day_of_week: u32,
    pub month: u32,
}

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("invalid UTC timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Parses a boundary reading. The timestamp must be RFC 3339 with an explicit
/// offset; naive timestamps are rejected rather than assumed UTC.
pub fn parse_raw(raw: &RawReading) -> Result<Reading, EnrichError> {
    let parsed = DateTime::parse_from_rfc3339(raw.timestamp.trim())
        .map_err(|_| EnrichError::InvalidTimestamp(raw.timestamp.clone()))?;

    Ok(Reading {
        ts_s_utc: parsed.with_timezone(&Utc).timestamp(),
        pm1: raw.pm1,
        pm25: raw.pm25,
        pm03: raw.pm03,
        relative_humidity: raw.relative_humidity,
        temperature: raw.temperature,
    })
}

/// Derives calendar fields for one reading.
pub fn enrich(reading: &Reading) -> Result<EnrichedReading, EnrichError> {
    let dt = utc_instant(reading.ts_s_utc)?;

    Ok(EnrichedReading {
        reading: *reading,
        hour: dt.hour(),
        day_of_week: dt.weekday().num_days_from_monday(),
        month: dt.month(),
    })
}

/// Enriches a batch with per-row isolation: a reading whose timestamp cannot
/// be mapped to a UTC instant is skipped and logged, never aborting the rest.
pub fn enrich_batch(readings: &[Reading]) -> (Vec<EnrichedReading>, u64) {
    let mut out = Vec::with_capacity(readings.len());
    let mut skipped = 0u64;

    for reading in readings {
        match enrich(reading) {
            Ok(enriched) => out.push(enriched),
            Err(err) => {
                warn!(
                    component = "enrich",
                    event = "enrich.row.skipped",
                    ts_s_utc = reading.ts_s_utc,
                    reason = %err
                );
                skipped += 1;
            }
        }
    }

    (out, skipped)
}

/// Rounds the five measurement values to `decimals` places.
///
/// Applied for storage/presentation only, after any feature or outlier
/// computation; rounding before derivation would bias those inputs.
pub fn round_reading(reading: &Reading, decimals: u32) -> Reading {
    Reading {
        ts_s_utc: reading.ts_s_utc,
        pm1: round_to(reading.pm1, decimals),
        pm25: round_to(reading.pm25, decimals),
        pm03: round_to(reading.pm03, decimals),
        relative_humidity: round_to(reading.relative_humidity, decimals),
        temperature: round_to(reading.temperature, decimals),
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn utc_instant(ts_s_utc: i64) -> Result<DateTime<Utc>, EnrichError> {
    Utc.timestamp_opt(ts_s_utc, 0)
        .single()
        .ok_or_else(|| EnrichError::InvalidTimestamp(ts_s_utc.to_string()))
}
