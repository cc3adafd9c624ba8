//! AQF core crate.
//!
//! Hourly air-quality readings flow in through the sensor API client or CSV
//! backfill, get calendar-enriched, pass the ingestion gate, and land in an
//! append-only SQLite store. Training builds a time-ordered (features, label)
//! dataset from the full history; serving assembles the same feature vector
//! from the latest persisted row and asks the linear model for the next
//! hour's PM2.5.

mod dataset;
mod enrich;
mod forecast;
mod ingest;
mod model;
mod observability;
mod outliers;
mod schema;
mod sensor_api;
mod store;

pub use dataset::{
    build_dataset, DatasetConfig, DatasetError, DatasetReport, DatasetSplit, LabelGapPolicy,
    TrainingExample,
};
pub use enrich::{
    enrich, enrich_batch, parse_raw, round_reading, EnrichError, EnrichedReading, RawReading,
    Reading,
};
pub use forecast::{predict_next_hour, prediction_history, ForecastError, PredictionRecord};
pub use ingest::{select_new, select_new_with_report, IngestReport};
pub use model::{mae, rmse, LinearModel, ModelError, Regressor};
pub use observability::{
    init_logging, log_app_start, log_ingest_summary, logging_config_from_env, LogFormat,
    LoggingConfig, LoggingInitError,
};
pub use outliers::{
    compute_bounds, filter_outliers, precomputed_bounds, OutlierBounds, OutlierError,
    ReadingColumn, ALL_COLUMNS,
};
pub use schema::{
    assert_schema_compatible, feature_schema, feature_vector, FeatureSchema, SchemaError,
    FEATURE_COLUMNS, FEATURE_SCHEMA_VERSION,
};
pub use sensor_api::{
    fetch_readings, load_readings_csv, FetchResult, ReqwestBlockingFetcher, SensorApiConfig,
    SensorApiError, SensorFetcher, SensorPayload,
};
pub use store::{ReadingStore, StoreError};
