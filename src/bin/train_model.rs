use std::path::PathBuf;

use aqf::{
    build_dataset, enrich_batch, feature_schema, init_logging, log_app_start,
    logging_config_from_env, mae, rmse, DatasetConfig, LabelGapPolicy, LinearModel, ReadingStore,
};

const APP: &str = "train_model";

/// Trains the next-hour PM2.5 model from the full persisted history and
/// writes it as JSON. `AQF_SPLIT_FRACTION` is required: the train/test split
/// is a deliberate choice, not a default.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(APP, &logging_cfg);

    let store_path = std::env::var("AQF_STORE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/readings.sqlite"));
    let model_path = std::env::var("AQF_MODEL_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/pm25_model.json"));

    let split_fraction: f64 = std::env::var("AQF_SPLIT_FRACTION")
        .map_err(|_| "AQF_SPLIT_FRACTION must be set (e.g. 0.8)")?
        .trim()
        .parse()?;

    let gap_policy = match std::env::var("AQF_LABEL_GAP_POLICY").as_deref() {
        Ok("use-adjacent") => LabelGapPolicy::UseAdjacent,
        Ok("skip-non-hourly") => LabelGapPolicy::SkipNonHourly,
        Ok(other) => return Err(format!("unknown AQF_LABEL_GAP_POLICY: {other}").into()),
        Err(_) => LabelGapPolicy::SkipNonHourly,
    };

    let store = ReadingStore::open(&store_path)?;
    let history = store.read_all()?;
    let (enriched, skipped) = enrich_batch(&history);
    if skipped > 0 {
        eprintln!("warning: {skipped} persisted rows had unmappable timestamps");
    }

    let split = build_dataset(
        &enriched,
        &DatasetConfig {
            split_fraction,
            gap_policy,
        },
    )?;

    let schema = feature_schema();
    let model = LinearModel::fit(&split.train, &schema)?;

    println!(
        "trained on {} examples ({} gap pairs skipped), test rows {}",
        split.report.train_rows, split.report.skipped_gap_pairs, split.report.test_rows
    );
    if !split.test.is_empty() {
        println!(
            "test MAE = {:.4}, test RMSE = {:.4}",
            mae(&model, &split.test)?,
            rmse(&model, &split.test)?
        );
    }

    model.save(&model_path)?;
    println!("model written to {}", model_path.display());

    Ok(())
}
