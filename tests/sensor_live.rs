//! Opt-in smoke test against a real sensor endpoint.
//!
//! Run with `cargo test --features live-sensor-tests` and
//! `AQF_SENSOR_API_URL` pointing at a reachable endpoint.

#![cfg(feature = "live-sensor-tests")]

use aqf::{fetch_readings, ReqwestBlockingFetcher, SensorApiConfig};

#[test]
fn live_endpoint_returns_a_parseable_batch() {
    let mut cfg = SensorApiConfig::default();
    if let Ok(url) = std::env::var("AQF_SENSOR_API_URL") {
        cfg.base_url = url;
    }

    let fetcher = ReqwestBlockingFetcher::new(cfg.http_timeout_ms).expect("client builds");
    let result = fetch_readings(&cfg, &fetcher).expect("live fetch succeeds");

    assert!(!result.readings.is_empty());
    assert!(result
        .readings
        .iter()
        .all(|r| r.ts_s_utc > 0 && r.pm25.is_finite()));
}
