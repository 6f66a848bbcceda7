//! Pipeline configuration with environment overrides.

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chunk::DateRange;
use crate::history::HistoryFeatureConfig;
use crate::source::{Coordinates, SourceConfig, WeatherQuery};
use crate::table::Variable;

pub const DEFAULT_LATITUDE: f64 = 35.8776;
pub const DEFAULT_LONGITUDE: f64 = -78.7875;
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

const DEFAULT_HISTORY_START: NaiveDate = ymd(2020, 1, 1);
const DEFAULT_HISTORY_END: NaiveDate = ymd(2025, 9, 16);
const DEFAULT_EVALUATION_START: NaiveDate = ymd(2025, 9, 17);
const DEFAULT_EVALUATION_END: NaiveDate = ymd(2025, 9, 30);
const DEFAULT_ORACLE_START: NaiveDate = ymd(2025, 8, 1);
const LAST_HOUR_OF_DAY: NaiveTime = match NaiveTime::from_hms_opt(23, 0, 0) {
    Some(time) => time,
    None => panic!("23:00:00 is a valid time"),
};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("invalid pipeline config: {0}")]
    Invalid(String),
    #[error("unknown IANA timezone '{0}'")]
    UnknownTimezone(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelinePaths {
    pub data_root: PathBuf,
}

impl PipelinePaths {
    pub fn raw_history_csv(&self, range: &DateRange) -> PathBuf {
        self.data_root.join("raw").join(format!(
            "openmeteo_rdu_{}_to_{}.csv",
            range.start, range.end
        ))
    }

    pub fn staging_csv(&self) -> PathBuf {
        self.data_root
            .join("staging")
            .join("rdu_weather_standardized.csv")
    }

    pub fn test_set_csv(&self, range: &DateRange) -> PathBuf {
        self.data_root.join("raw").join(format!(
            "rdu_test_set_{}_to_{}.csv",
            range.start, range.end
        ))
    }

    pub fn training_csv(&self) -> PathBuf {
        self.data_root.join("processed").join("xgb_train_full.csv")
    }

    pub fn inference_csv(&self, range: &DateRange) -> PathBuf {
        self.data_root.join("processed").join(format!(
            "infer_features_{}_to_{}.csv",
            range.start, range.end
        ))
    }

    pub fn climatology_evaluation_csv(&self, range: &DateRange) -> PathBuf {
        self.data_root.join("processed").join(format!(
            "xgb_test_with_climatology_{}_to_{}.csv",
            range.start, range.end
        ))
    }

    pub fn oracle_evaluation_csv(&self, range: &DateRange) -> PathBuf {
        self.data_root.join("processed").join(format!(
            "xgb_test_oracle_{}_to_{}.csv",
            range.start, range.end
        ))
    }
}

impl Default for PipelinePaths {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub coordinates: Coordinates,
    pub timezone: String,
    pub variables: Vec<Variable>,
    pub history_range: DateRange,
    /// Last hour a training row may have.
    pub training_cutoff: NaiveDateTime,
    pub evaluation_range: DateRange,
    /// Raw window for oracle evaluation; must cover `evaluation_range`.
    pub oracle_window: DateRange,
    pub history: HistoryFeatureConfig,
    /// `None` derives the years present in history before the evaluation year.
    pub climatology_reference_years: Option<Vec<i32>>,
    pub source: SourceConfig,
    pub paths: PipelinePaths,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            coordinates: Coordinates {
                latitude: DEFAULT_LATITUDE,
                longitude: DEFAULT_LONGITUDE,
            },
            timezone: DEFAULT_TIMEZONE.to_string(),
            variables: vec![Variable::Temperature],
            history_range: DateRange::new(DEFAULT_HISTORY_START, DEFAULT_HISTORY_END),
            training_cutoff: DEFAULT_HISTORY_END.and_time(LAST_HOUR_OF_DAY),
            evaluation_range: DateRange::new(DEFAULT_EVALUATION_START, DEFAULT_EVALUATION_END),
            oracle_window: DateRange::new(DEFAULT_ORACLE_START, DEFAULT_EVALUATION_END),
            history: HistoryFeatureConfig::default(),
            climatology_reference_years: None,
            source: SourceConfig::default(),
            paths: PipelinePaths::default(),
        }
    }
}

impl PipelineConfig {
    pub fn query_for(&self, range: DateRange) -> WeatherQuery {
        WeatherQuery {
            coordinates: self.coordinates,
            range,
            variables: self.variables.clone(),
            timezone: self.timezone.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let lat = self.coordinates.latitude;
        let lon = self.coordinates.longitude;
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(ConfigError::Invalid(format!(
                "latitude {lat} outside [-90, 90]"
            )));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(ConfigError::Invalid(format!(
                "longitude {lon} outside [-180, 180]"
            )));
        }
        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::UnknownTimezone(self.timezone.clone()));
        }

        if self.variables.is_empty() {
            return Err(ConfigError::Invalid(
                "variables must not be empty".to_string(),
            ));
        }
        let unique: HashSet<Variable> = self.variables.iter().copied().collect();
        if unique.len() != self.variables.len() {
            return Err(ConfigError::Invalid(
                "variables must be unique".to_string(),
            ));
        }
        if !self.variables.contains(&self.history.target) {
            return Err(ConfigError::Invalid(format!(
                "target {} is not among the requested variables",
                self.history.target.column_name()
            )));
        }

        for (name, range) in [
            ("history_range", self.history_range),
            ("evaluation_range", self.evaluation_range),
            ("oracle_window", self.oracle_window),
        ] {
            if range.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "{name} end {} is before start {}",
                    range.end, range.start
                )));
            }
        }
        if self.oracle_window.start > self.evaluation_range.start
            || self.oracle_window.end < self.evaluation_range.end
        {
            return Err(ConfigError::Invalid(
                "oracle_window must cover evaluation_range".to_string(),
            ));
        }
        if self.training_cutoff >= self.evaluation_range.first_hour() {
            return Err(ConfigError::Invalid(format!(
                "training_cutoff {} must precede evaluation start {}",
                self.training_cutoff, self.evaluation_range.start
            )));
        }

        crate::history::validate_history_config(&self.history)
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;

        if self.source.http_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "source.http_timeout_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Defaults overridden by `WXF_DATA_ROOT`, `WXF_START_DATE`, `WXF_END_DATE`,
/// `WXF_TIMEZONE`, `WXF_LATITUDE` and `WXF_LONGITUDE`.
///
/// Overriding the end date moves the training cutoff to 23:00 of that day.
pub fn pipeline_config_from_env() -> Result<PipelineConfig, ConfigError> {
    let mut cfg = PipelineConfig::default();

    if let Some(root) = env_value("WXF_DATA_ROOT") {
        cfg.paths.data_root = PathBuf::from(root);
    }
    if let Some(raw) = env_value("WXF_START_DATE") {
        cfg.history_range.start = parse_date("WXF_START_DATE", &raw)?;
    }
    if let Some(raw) = env_value("WXF_END_DATE") {
        cfg.history_range.end = parse_date("WXF_END_DATE", &raw)?;
        cfg.training_cutoff = cfg.history_range.last_hour();
    }
    if let Some(tz) = env_value("WXF_TIMEZONE") {
        cfg.timezone = tz;
    }
    if let Some(raw) = env_value("WXF_LATITUDE") {
        cfg.coordinates.latitude = parse_f64("WXF_LATITUDE", &raw)?;
    }
    if let Some(raw) = env_value("WXF_LONGITUDE") {
        cfg.coordinates.longitude = parse_f64("WXF_LONGITUDE", &raw)?;
    }

    cfg.validate()?;
    Ok(cfg)
}

pub(crate) fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_date(key: &'static str, raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| ConfigError::InvalidEnv {
        key,
        value: raw.to_string(),
    })
}

fn parse_f64(key: &'static str, raw: &str) -> Result<f64, ConfigError> {
    raw.parse::<f64>().map_err(|_| ConfigError::InvalidEnv {
        key,
        value: raw.to_string(),
    })
}

/// Only used for `const` items, so an invalid date fails the build.
const fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => date,
        None => panic!("invalid calendar date"),
    }
}
