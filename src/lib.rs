//! Hourly weather history and forecasting-feature pipeline.
//!
//! Implemented scope:
//! - Open-Meteo archive fetch in calendar-year chunks
//! - merge/dedupe/cadence validation of hourly observations
//! - calendar, lag and trailing-window features (training, climatology and oracle modes)
//! - feature frame assembly with schema fingerprints and CSV persistence

mod assemble;
mod calendar;
mod chunk;
mod climatology;
mod config;
mod frame;
mod history;
mod normalize;
mod observability;
mod persist;
mod pipeline;
mod source;
mod table;

pub use assemble::{
    assemble_climatology_evaluation_frame, assemble_inference_frame,
    assemble_oracle_evaluation_frame, assemble_training_frame, assert_schema_compatible,
    check_no_leakage, inference_columns, training_columns, AssembleError, AssembleReport,
    AssembledFrame, FeatureSchema, FrameKind, MissingPolicy, FEATURE_SCHEMA_VERSION,
};
pub use calendar::{add_calendar_features, calendar_features, CalendarFeatures, CALENDAR_COLUMNS};
pub use chunk::{year_chunks, DateRange, YearChunkIter, YearChunks};
pub use climatology::{
    add_climatology_history_features, resolve_reference_years, ClimatologyIndex,
    ClimatologyReport, ProvenanceCounts, RollingStats,
};
pub use config::{
    pipeline_config_from_env, ConfigError, PipelineConfig, PipelinePaths, DEFAULT_LATITUDE,
    DEFAULT_LONGITUDE, DEFAULT_TIMEZONE,
};
pub use frame::{FeatureColumn, FeatureFrame, FrameError, Provenance, SourcedValue};
pub use history::{
    add_history_features, diff_column, history_columns, lag_column, rolling_mean_column,
    rolling_std_column, validate_history_config, FeatureError, HistoryFeatureConfig,
    DEFAULT_LAG_OFFSETS, DEFAULT_MIN_PERIODS, DEFAULT_ROLLING_WINDOWS,
};
pub use normalize::{
    normalize, validate_table, CadenceSummary, NormalizeError, NormalizeReport, NormalizedTable,
};
pub use observability::{
    env_filter, init_logging, log_app_start, log_output_written, logging_config_from_env,
    LogFormat, LoggingConfig, LoggingInitError,
};
pub use persist::{
    feature_csv_header, read_staging_csv, write_feature_csv, write_staging_csv, PersistError,
    TIME_COLUMN,
};
pub use pipeline::{
    build_climatology_evaluation, build_inference_features, build_oracle_evaluation,
    build_training_features, fetch_range, fetch_staging, fetch_test_set, write_staging_outputs,
    PipelineError,
};
pub use source::{
    build_query_url, clip_to_range, fetch_observations, fetch_observations_with_fetcher,
    Coordinates, HttpFetcher, HttpResponse, ReqwestBlockingFetcher, SourceConfig, SourceError,
    WeatherQuery, OPEN_METEO_ARCHIVE_URL,
};
pub use table::{
    format_local_timestamp, parse_local_timestamp, Observation, ObservationRow,
    ObservationTable, Variable, ALL_VARIABLES,
};
