//! Sensor API client and CSV backfill loading.

use std::path::{Path, PathBuf};

use csv::StringRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::enrich::{parse_raw, RawReading, Reading};

const CSV_COLUMNS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorApiConfig {
    pub base_url: String,
    pub http_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for SensorApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9000/api/readings/latest".to_string(),
            http_timeout_ms: 15_000,
            max_retries: 2,
            retry_backoff_ms: 200,
        }
    }
}

/// JSON payload shape of the sensor endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPayload {
    pub readings: Vec<RawReading>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub readings: Vec<Reading>,
    pub skipped_rows: u64,
}

#[derive(Debug, Error)]
pub enum SensorApiError {
    #[error("HTTP client build error: {0}")]
    HttpClientBuild(String),
    #[error("HTTP request failed for {url}: {message}")]
    HttpRequest { url: String, message: String },
    #[error("invalid sensor payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV record at line {line} has {found} columns, expected {expected}")]
    InvalidRecordColumns {
        line: u64,
        found: usize,
        expected: usize,
    },
    #[error("failed to parse field {field} value '{value}'")]
    ParseField { field: &'static str, value: String },
    #[error("CSV file not found: {path}")]
    MissingFile { path: PathBuf },
}

pub trait SensorFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SensorApiError>;
}

pub struct ReqwestBlockingFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestBlockingFetcher {
    pub fn new(timeout_ms: u64) -> Result<Self, SensorApiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| SensorApiError::HttpClientBuild(err.to_string()))?;
        Ok(Self { client })
    }
}

impl SensorFetcher for ReqwestBlockingFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SensorApiError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SensorApiError::HttpRequest {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SensorApiError::HttpRequest {
                url: url.to_string(),
                message: format!("unexpected HTTP status {status}"),
            });
        }

        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| SensorApiError::HttpRequest {
                url: url.to_string(),
                message: err.to_string(),
            })
    }
}

/// Fetches the latest raw readings from the sensor endpoint.
///
/// Transport failures are retried with bounded exponential backoff; a row
/// with an unparseable timestamp is skipped and logged so one bad row never
/// blocks the rest of the batch.
pub fn fetch_readings(
    cfg: &SensorApiConfig,
    fetcher: &dyn SensorFetcher,
) -> Result<FetchResult, SensorApiError> {
    let payload = fetch_bytes_with_retry(fetcher, &cfg.base_url, cfg)?;
    let parsed: SensorPayload = serde_json::from_slice(&payload)?;

    let (readings, skipped_rows) = parse_raw_batch(&parsed.readings);

    info!(
        component = "sensor_api",
        event = "sensor.fetch.finish",
        url = %cfg.base_url,
        payload_rows = parsed.readings.len(),
        parsed_rows = readings.len(),
        skipped_rows = skipped_rows
    );

    Ok(FetchResult {
        readings,
        skipped_rows,
    })
}

/// Loads a readings CSV export for backfill. Expects a header row of
/// `timestamp,pm1,pm25,pm03,relative_humidity,temperature`, timestamps in
/// RFC 3339. Malformed timestamps skip the row; malformed numeric fields are
/// a hard error since they indicate a wrong or truncated file.
pub fn load_readings_csv(path: &Path) -> Result<FetchResult, SensorApiError> {
    if !path.exists() {
        return Err(SensorApiError::MissingFile {
            path: path.to_path_buf(),
        });
    }

    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;

    let mut raws = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        raws.push(parse_csv_record(&record, idx as u64 + 2)?);
    }

    let (readings, skipped_rows) = parse_raw_batch(&raws);

    info!(
        component = "sensor_api",
        event = "sensor.csv.finish",
        path = %path.display(),
        file_rows = raws.len(),
        parsed_rows = readings.len(),
        skipped_rows = skipped_rows
    );

    Ok(FetchResult {
        readings,
        skipped_rows,
    })
}

fn parse_raw_batch(raws: &[RawReading]) -> (Vec<Reading>, u64) {
    let mut readings = Vec::with_capacity(raws.len());
    let mut skipped = 0u64;

    for raw in raws {
        match parse_raw(raw) {
            Ok(reading) => readings.push(reading),
            Err(err) => {
                warn!(
                    component = "sensor_api",
                    event = "sensor.row.skipped",
                    timestamp = %raw.timestamp,
                    reason = %err
                );
                skipped += 1;
            }
        }
    }

    (readings, skipped)
}

fn parse_csv_record(record: &StringRecord, line: u64) -> Result<RawReading, SensorApiError> {
    if record.len() < CSV_COLUMNS {
        return Err(SensorApiError::InvalidRecordColumns {
            line,
            found: record.len(),
            expected: CSV_COLUMNS,
        });
    }

    Ok(RawReading {
        timestamp: record.get(0).unwrap_or_default().to_string(),
        pm1: parse_f64(record, 1, "pm1")?,
        pm25: parse_f64(record, 2, "pm25")?,
        pm03: parse_f64(record, 3, "pm03")?,
        relative_humidity: parse_f64(record, 4, "relative_humidity")?,
        temperature: parse_f64(record, 5, "temperature")?,
    })
}

fn parse_f64(record: &StringRecord, idx: usize, field: &'static str) -> Result<f64, SensorApiError> {
    let raw = record.get(idx).unwrap_or_default();
    raw.trim()
        .parse::<f64>()
        .map_err(|_| SensorApiError::ParseField {
            field,
            value: raw.to_string(),
        })
}

fn fetch_bytes_with_retry(
    fetcher: &dyn SensorFetcher,
    url: &str,
    cfg: &SensorApiConfig,
) -> Result<Vec<u8>, SensorApiError> {
    let mut attempt: u32 = 0;
    loop {
        match fetcher.get_bytes(url) {
            Ok(bytes) => return Ok(bytes),
            Err(err) if attempt >= cfg.max_retries => return Err(err),
            Err(_) => {
                attempt = attempt.saturating_add(1);
                let shift = attempt.saturating_sub(1).min(10);
                let factor = 1u64 << shift;
                let sleep_ms = cfg.retry_backoff_ms.saturating_mul(factor);
                std::thread::sleep(std::time::Duration::from_millis(sleep_ms));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;
    use tempfile::tempdir;

    struct StaticFetcher {
        body: Vec<u8>,
        failures_before_success: Cell<u32>,
    }

    impl StaticFetcher {
        fn ok(body: &[u8]) -> Self {
            Self {
                body: body.to_vec(),
                failures_before_success: Cell::new(0),
            }
        }

        fn flaky(body: &[u8], failures: u32) -> Self {
            Self {
                body: body.to_vec(),
                failures_before_success: Cell::new(failures),
            }
        }
    }

    impl SensorFetcher for StaticFetcher {
        fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SensorApiError> {
            let remaining = self.failures_before_success.get();
            if remaining > 0 {
                self.failures_before_success.set(remaining - 1);
                return Err(SensorApiError::HttpRequest {
                    url: url.to_string(),
                    message: "simulated outage".to_string(),
                });
            }
            Ok(self.body.clone())
        }
    }

    fn fast_cfg() -> SensorApiConfig {
        SensorApiConfig {
            retry_backoff_ms: 1,
            ..SensorApiConfig::default()
        }
    }

    fn sample_payload() -> &'static str {
        r#"{"readings":[
            {"timestamp":"2025-01-01T10:00:00Z","pm1":4.2,"pm25":7.7,"pm03":710.0,"relative_humidity":48.5,"temperature":21.7},
            {"timestamp":"not-a-timestamp","pm1":1.0,"pm25":2.0,"pm03":3.0,"relative_humidity":4.0,"temperature":5.0},
            {"timestamp":"2025-01-01T11:00:00Z","pm1":4.4,"pm25":8.1,"pm03":720.0,"relative_humidity":47.9,"temperature":22.0}
        ]}"#
    }

    #[test]
    fn fetch_parses_rows_and_isolates_bad_timestamps() {
        let fetcher = StaticFetcher::ok(sample_payload().as_bytes());
        let result = fetch_readings(&fast_cfg(), &fetcher).unwrap();

        assert_eq!(result.readings.len(), 2);
        assert_eq!(result.skipped_rows, 1);
        assert_eq!(result.readings[0].ts_s_utc, 1_735_725_600);
        assert_eq!(result.readings[1].ts_s_utc, 1_735_729_200);
    }

    #[test]
    fn transient_transport_failures_are_retried() {
        let fetcher = StaticFetcher::flaky(sample_payload().as_bytes(), 2);
        let result = fetch_readings(&fast_cfg(), &fetcher).unwrap();
        assert_eq!(result.readings.len(), 2);
    }

    #[test]
    fn exhausted_retries_surface_the_transport_error() {
        let fetcher = StaticFetcher::flaky(sample_payload().as_bytes(), 5);
        let err = fetch_readings(&fast_cfg(), &fetcher).unwrap_err();
        assert!(matches!(err, SensorApiError::HttpRequest { .. }));
    }

    #[test]
    fn malformed_json_is_an_invalid_payload_error() {
        let fetcher = StaticFetcher::ok(b"{\"nope\": true}");
        let err = fetch_readings(&fast_cfg(), &fetcher).unwrap_err();
        assert!(matches!(err, SensorApiError::InvalidPayload(_)));
    }

    #[test]
    fn csv_backfill_parses_header_file_and_skips_bad_timestamps() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("readings.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "timestamp,pm1,pm25,pm03,relative_humidity,temperature").unwrap();
        writeln!(file, "2025-01-01T10:00:00Z,4.2,7.7,710.0,48.5,21.7").unwrap();
        writeln!(file, "garbage,1.0,2.0,3.0,4.0,5.0").unwrap();
        writeln!(file, "2025-01-01T11:00:00Z,4.4,8.1,720.0,47.9,22.0").unwrap();

        let result = load_readings_csv(&path).unwrap();
        assert_eq!(result.readings.len(), 2);
        assert_eq!(result.skipped_rows, 1);
    }

    #[test]
    fn csv_with_malformed_numbers_is_a_hard_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("readings.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "timestamp,pm1,pm25,pm03,relative_humidity,temperature").unwrap();
        writeln!(file, "2025-01-01T10:00:00Z,oops,7.7,710.0,48.5,21.7").unwrap();

        let err = load_readings_csv(&path).unwrap_err();
        assert!(matches!(
            err,
            SensorApiError::ParseField { field: "pm1", .. }
        ));
    }

    #[test]
    fn missing_csv_file_is_reported_as_such() {
        let err = load_readings_csv(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, SensorApiError::MissingFile { .. }));
    }
}
