use std::path::PathBuf;

use aqf::{
    enrich_batch, init_logging, log_app_start, log_ingest_summary, load_readings_csv,
    logging_config_from_env, round_reading, select_new_with_report, ReadingStore,
};

const APP: &str = "backfill_csv";
const ROUND_DECIMALS: u32 = 2;

/// Imports a historical readings CSV through the same gate and store path as
/// live ingestion, so a backfill can never introduce duplicates.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(APP, &logging_cfg);

    let csv_path = std::env::var("AQF_BACKFILL_CSV")
        .map(PathBuf::from)
        .map_err(|_| "AQF_BACKFILL_CSV must point at the readings CSV")?;
    let store_path = std::env::var("AQF_STORE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/readings.sqlite"));

    let mut store = ReadingStore::open(&store_path)?;
    let loaded = load_readings_csv(&csv_path)?;

    let (enriched, enrich_skipped) = enrich_batch(&loaded.readings);
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
        loaded.skipped_rows + enrich_skipped,
    );

    println!(
        "backfill complete: {} file rows, {} appended, store now at {} rows",
        report.fetched_rows,
        inserted,
        store.count()?
    );

    Ok(())
}
