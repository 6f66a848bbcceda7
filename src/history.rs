//! Leakage-free lag, difference and trailing-window features for training frames.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::frame::{FeatureColumn, FeatureFrame, FrameError};
use crate::table::Variable;

pub const DEFAULT_LAG_OFFSETS: [u32; 5] = [1, 24, 48, 72, 168];
pub const DEFAULT_ROLLING_WINDOWS: [u32; 2] = [24, 168];
pub const DEFAULT_MIN_PERIODS: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFeatureConfig {
    pub target: Variable,
    pub lag_offsets: Vec<u32>,
    pub rolling_windows: Vec<u32>,
    pub min_periods: usize,
}

impl Default for HistoryFeatureConfig {
    fn default() -> Self {
        Self {
            target: Variable::Temperature,
            lag_offsets: DEFAULT_LAG_OFFSETS.to_vec(),
            rolling_windows: DEFAULT_ROLLING_WINDOWS.to_vec(),
            min_periods: DEFAULT_MIN_PERIODS,
        }
    }
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("invalid history feature config: {0}")]
    InvalidConfig(String),
    #[error("frame has no observed column '{0}'")]
    MissingTargetColumn(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub fn lag_column(variable: Variable, lag: u32) -> String {
    format!("{}_lag_{lag}", variable.feature_stem())
}

pub fn diff_column(variable: Variable) -> String {
    format!("{}_diff_1", variable.feature_stem())
}

pub fn rolling_mean_column(window: u32) -> String {
    format!("roll_mean_{window}")
}

pub fn rolling_std_column(window: u32) -> String {
    format!("roll_std_{window}")
}

/// History column names in persisted order: lags, diff, all means, all stds.
pub fn history_columns(cfg: &HistoryFeatureConfig) -> Vec<String> {
    let mut names: Vec<String> = cfg
        .lag_offsets
        .iter()
        .map(|lag| lag_column(cfg.target, *lag))
        .collect();
    names.push(diff_column(cfg.target));
    names.extend(cfg.rolling_windows.iter().map(|w| rolling_mean_column(*w)));
    names.extend(cfg.rolling_windows.iter().map(|w| rolling_std_column(*w)));
    names
}

pub fn validate_history_config(cfg: &HistoryFeatureConfig) -> Result<(), FeatureError> {
    if cfg.lag_offsets.is_empty() {
        return Err(FeatureError::InvalidConfig(
            "lag_offsets must not be empty".to_string(),
        ));
    }
    if cfg.min_periods < 2 {
        return Err(FeatureError::InvalidConfig(
            "min_periods must be >= 2 for a sample standard deviation".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for lag in &cfg.lag_offsets {
        if *lag == 0 {
            return Err(FeatureError::InvalidConfig(
                "lag_offsets entries must be > 0".to_string(),
            ));
        }
        if !seen.insert(*lag) {
            return Err(FeatureError::InvalidConfig(
                "lag_offsets entries must be unique".to_string(),
            ));
        }
    }

    let mut seen = HashSet::new();
    for window in &cfg.rolling_windows {
        if *window == 0 {
            return Err(FeatureError::InvalidConfig(
                "rolling_windows entries must be > 0".to_string(),
            ));
        }
        if !seen.insert(*window) {
            return Err(FeatureError::InvalidConfig(
                "rolling_windows entries must be unique".to_string(),
            ));
        }
    }

    Ok(())
}

/// Adds training-mode history features to a frame holding the observed target column.
///
/// Lags shift by row position. Rolling windows end at the previous row, so
/// no feature of row `i` reads row `i` or later. Rows without enough leading
/// history get `None` and are dropped by the assembler.
pub fn add_history_features(
    frame: &FeatureFrame,
    cfg: &HistoryFeatureConfig,
) -> Result<FeatureFrame, FeatureError> {
    validate_history_config(cfg)?;
    let observed_name = cfg.target.column_name();
    let observed = frame
        .values(observed_name)
        .ok_or_else(|| FeatureError::MissingTargetColumn(observed_name.to_string()))?;

    let mut out = frame.clone();
    for lag in &cfg.lag_offsets {
        let values = shift(observed, *lag as usize);
        out = out.with_column(FeatureColumn::new(lag_column(cfg.target, *lag), values))?;
    }

    let diff = (0..observed.len())
        .map(|i| {
            if i < 2 {
                return None;
            }
            match (observed[i - 1], observed[i - 2]) {
                (Some(a), Some(b)) => Some(a - b),
                _ => None,
            }
        })
        .collect();
    out = out.with_column(FeatureColumn::new(diff_column(cfg.target), diff))?;

    let mut means = Vec::with_capacity(cfg.rolling_windows.len());
    let mut stds = Vec::with_capacity(cfg.rolling_windows.len());
    for window in &cfg.rolling_windows {
        let (mean, std) = trailing_stats(observed, *window as usize, cfg.min_periods);
        means.push(FeatureColumn::new(rolling_mean_column(*window), mean));
        stds.push(FeatureColumn::new(rolling_std_column(*window), std));
    }
    for column in means.into_iter().chain(stds) {
        out = out.with_column(column)?;
    }

    info!(
        component = "history",
        event = "history.training.built",
        rows = out.len(),
        lags = ?cfg.lag_offsets,
        windows = ?cfg.rolling_windows,
        min_periods = cfg.min_periods
    );

    Ok(out)
}

fn shift(values: &[Option<f64>], lag: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| if i >= lag { values[i - lag] } else { None })
        .collect()
}

/// Mean and sample std over the `window` rows before each row.
fn trailing_stats(
    values: &[Option<f64>],
    window: usize,
    min_periods: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let mut trailing: VecDeque<Option<f64>> = VecDeque::with_capacity(window + 1);
    let mut means = Vec::with_capacity(values.len());
    let mut stds = Vec::with_capacity(values.len());

    for value in values {
        let present: Vec<f64> = trailing.iter().flatten().copied().collect();
        if present.len() >= min_periods {
            let (mean, std) = mean_and_sample_std(&present);
            means.push(Some(mean));
            stds.push(Some(std));
        } else {
            means.push(None);
            stds.push(None);
        }

        trailing.push_back(*value);
        while trailing.len() > window {
            trailing.pop_front();
        }
    }

    (means, stds)
}

/// Arithmetic mean and n-1 standard deviation; the std of fewer than two values is 0.
pub(crate) fn mean_and_sample_std(values: &[f64]) -> (f64, f64) {
    mean_and_std(values, 1)
}

/// Arithmetic mean and n standard deviation.
pub(crate) fn mean_and_population_std(values: &[f64]) -> (f64, f64) {
    mean_and_std(values, 0)
}

fn mean_and_std(values: &[f64], ddof: usize) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() <= ddof {
        return (mean, 0.0);
    }
    let variance = values
        .iter()
        .map(|v| {
            let d = *v - mean;
            d * d
        })
        .sum::<f64>()
        / (values.len() - ddof) as f64;
    (mean, variance.sqrt())
}
