use std::path::PathBuf;

use aqf::{
    enrich_batch, fetch_readings, init_logging, log_app_start, log_ingest_summary,
    logging_config_from_env, round_reading, select_new_with_report, ReadingStore,
    ReqwestBlockingFetcher, SensorApiConfig,
};

const APP: &str = "ingest_run";
const ROUND_DECIMALS: u32 = 2;

/// One ingestion pass: fetch the latest readings, enrich, gate against the
/// store's latest timestamp, append. Invoked by an external scheduler (cron);
/// safe to re-run at any cadence since the gate and the store's timestamp
/// key are both idempotent.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(APP, &logging_cfg);

    let store_path = std::env::var("AQF_STORE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/readings.sqlite"));

    let mut api_cfg = SensorApiConfig::default();
    if let Ok(url) = std::env::var("AQF_SENSOR_API_URL") {
        if !url.trim().is_empty() {
            api_cfg.base_url = url.trim().to_string();
        }
    }

    let mut store = ReadingStore::open(&store_path)?;
    let fetcher = ReqwestBlockingFetcher::new(api_cfg.http_timeout_ms)?;
    let fetched = fetch_readings(&api_cfg, &fetcher)?;

    // Enrichment validates each row's timestamp before anything is persisted;
    // rounding happens afterwards, on the rows that are actually stored.
    let (enriched, enrich_skipped) = enrich_batch(&fetched.readings);
    let validated: Vec<_> = enriched
        .iter()
        .map(|e| round_reading(&e.reading, ROUND_DECIMALS))
        .collect();

    let latest = store.latest_timestamp()?;
    let (selected, report) = select_new_with_report(latest, &validated);
    let inserted = store.append(&selected)?;

    log_ingest_summary(
        APP,
        report.fetched_rows,
        report.selected_rows,
        inserted,
        fetched.skipped_rows + enrich_skipped,
    );

    Ok(())
}
