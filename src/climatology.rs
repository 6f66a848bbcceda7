//! Evaluation-mode history features backed by real history with a climatology fallback.
//!
//! Each lag or window input at time `t` resolves to the real observation at
//! `t` when the history holds one, otherwise to the mean of the reference
//! years' observations at the same month, day and hour. Every produced value
//! carries its [`Provenance`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, Duration as ChronoDuration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::frame::{FeatureColumn, FeatureFrame, Provenance, SourcedValue};
use crate::history::{
    diff_column, lag_column, mean_and_population_std, rolling_mean_column, rolling_std_column,
    validate_history_config, FeatureError, HistoryFeatureConfig,
};
use crate::table::{ObservationTable, Variable};

type CalendarKey = (u32, u32, u32);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollingStats {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub real_points: usize,
    pub climatology_points: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProvenanceCounts {
    pub real: u64,
    pub climatology: u64,
    pub missing: u64,
}

impl ProvenanceCounts {
    fn record(&mut self, provenance: Provenance) {
        match provenance {
            Provenance::Real => self.real += 1,
            Provenance::Climatology => self.climatology += 1,
            Provenance::Missing => self.missing += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClimatologyReport {
    pub lags: Vec<(u32, ProvenanceCounts)>,
    /// Per window: rows whose mean/std could not be formed.
    pub rolling_rows_missing: Vec<(u32, u64)>,
}

/// Constant-time lookup structure over a historical observation table.
#[derive(Debug, Clone)]
pub struct ClimatologyIndex {
    exact: HashMap<NaiveDateTime, f64>,
    by_calendar: HashMap<CalendarKey, BTreeMap<i32, f64>>,
    means: HashMap<CalendarKey, f64>,
    reference_years: BTreeSet<i32>,
}

impl ClimatologyIndex {
    pub fn build(
        history: &ObservationTable,
        variable: Variable,
        reference_years: &[i32],
    ) -> Result<Self, FeatureError> {
        let observations = history
            .observations(variable)
            .ok_or_else(|| FeatureError::MissingTargetColumn(variable.column_name().to_string()))?;
        let reference_years: BTreeSet<i32> = reference_years.iter().copied().collect();

        let mut exact = HashMap::with_capacity(observations.len());
        let mut by_calendar: HashMap<CalendarKey, BTreeMap<i32, f64>> = HashMap::new();
        for obs in &observations {
            exact.entry(obs.time).or_insert(obs.value);
            by_calendar
                .entry(calendar_key(obs.time))
                .or_default()
                .entry(obs.time.year())
                .or_insert(obs.value);
        }

        let means = by_calendar
            .iter()
            .filter_map(|(key, years)| {
                let matches: Vec<f64> = years
                    .iter()
                    .filter(|(year, _)| reference_years.contains(*year))
                    .map(|(_, value)| *value)
                    .collect();
                if matches.is_empty() {
                    None
                } else {
                    Some((*key, matches.iter().sum::<f64>() / matches.len() as f64))
                }
            })
            .collect();

        Ok(Self {
            exact,
            by_calendar,
            means,
            reference_years,
        })
    }

    pub fn reference_years(&self) -> Vec<i32> {
        self.reference_years.iter().copied().collect()
    }

    pub fn real_value(&self, time: NaiveDateTime) -> Option<f64> {
        self.exact.get(&time).copied()
    }

    /// The observation recorded for `(month, day, hour)` in `year`, if any.
    pub fn value_in_year(&self, month: u32, day: u32, hour: u32, year: i32) -> Option<f64> {
        self.by_calendar
            .get(&(month, day, hour))
            .and_then(|years| years.get(&year))
            .copied()
    }

    pub fn climatology_mean(&self, month: u32, day: u32, hour: u32) -> Option<f64> {
        self.means.get(&(month, day, hour)).copied()
    }

    /// Real value at `time`, else the reference-year mean for its calendar slot, else missing.
    pub fn lookup(&self, time: NaiveDateTime) -> SourcedValue {
        if let Some(value) = self.real_value(time) {
            return SourcedValue::real(value);
        }
        let (month, day, hour) = calendar_key(time);
        match self.climatology_mean(month, day, hour) {
            Some(mean) => SourcedValue::climatology(mean),
            None => SourcedValue::missing(),
        }
    }

    pub fn get_lag_value(&self, target: NaiveDateTime, lag_hours: u32) -> SourcedValue {
        self.lookup(target - ChronoDuration::hours(i64::from(lag_hours)))
    }

    /// Mean and population std over the `window` hours before `target`, each hour
    /// resolved through [`lookup`](Self::lookup). Both are `None` unless at
    /// least `max(min_periods, window / 2)` hours resolved to a value.
    pub fn get_rolling_stats(
        &self,
        target: NaiveDateTime,
        window: u32,
        min_periods: usize,
    ) -> RollingStats {
        let mut values = Vec::with_capacity(window as usize);
        let mut real_points = 0usize;
        let mut climatology_points = 0usize;

        for offset in 1..=window {
            let resolved = self.get_lag_value(target, offset);
            if let Some(value) = resolved.value {
                values.push(value);
                match resolved.provenance {
                    Provenance::Real => real_points += 1,
                    _ => climatology_points += 1,
                }
            }
        }

        let required = min_periods.max(window as usize / 2);
        let (mean, std) = if values.len() >= required {
            let (mean, std) = mean_and_population_std(&values);
            (Some(mean), Some(std))
        } else {
            (None, None)
        };

        RollingStats {
            mean,
            std,
            real_points,
            climatology_points,
        }
    }
}

/// Explicit years when given, otherwise every year in `history` before `evaluation_year`.
pub fn resolve_reference_years(
    history: &ObservationTable,
    explicit: Option<&[i32]>,
    evaluation_year: i32,
) -> Vec<i32> {
    if let Some(years) = explicit {
        let unique: BTreeSet<i32> = years.iter().copied().collect();
        return unique.into_iter().collect();
    }
    let years: BTreeSet<i32> = history
        .rows()
        .iter()
        .map(|row| row.time.year())
        .filter(|year| *year < evaluation_year)
        .collect();
    years.into_iter().collect()
}

/// Evaluation-mode counterpart of [`add_history_features`](crate::add_history_features).
///
/// Lag columns carry provenance. The difference feature is
/// `lag(1) - lag(2)` and is missing when either side is.
pub fn add_climatology_history_features(
    frame: &FeatureFrame,
    index: &ClimatologyIndex,
    cfg: &HistoryFeatureConfig,
) -> Result<(FeatureFrame, ClimatologyReport), FeatureError> {
    validate_history_config(cfg)?;
    let times = frame.times();
    let mut out = frame.clone();
    let mut report = ClimatologyReport::default();

    for lag in &cfg.lag_offsets {
        let sourced: Vec<SourcedValue> = times
            .iter()
            .map(|t| index.get_lag_value(*t, *lag))
            .collect();
        let mut counts = ProvenanceCounts::default();
        for value in &sourced {
            counts.record(value.provenance);
        }
        info!(
            component = "climatology",
            event = "history.climatology.lag_summary",
            lag = *lag,
            real = counts.real,
            climatology = counts.climatology,
            missing = counts.missing
        );
        report.lags.push((*lag, counts));
        out = out.with_column(FeatureColumn::sourced(lag_column(cfg.target, *lag), &sourced))?;
    }

    let diff = times
        .iter()
        .map(|t| {
            match (
                index.get_lag_value(*t, 1).value,
                index.get_lag_value(*t, 2).value,
            ) {
                (Some(a), Some(b)) => Some(a - b),
                _ => None,
            }
        })
        .collect();
    out = out.with_column(FeatureColumn::new(diff_column(cfg.target), diff))?;

    let mut means = Vec::with_capacity(cfg.rolling_windows.len());
    let mut stds = Vec::with_capacity(cfg.rolling_windows.len());
    for window in &cfg.rolling_windows {
        let stats: Vec<RollingStats> = times
            .iter()
            .map(|t| index.get_rolling_stats(*t, *window, cfg.min_periods))
            .collect();
        let rows_missing = stats.iter().filter(|s| s.mean.is_none()).count() as u64;
        let climatology_points: usize = stats.iter().map(|s| s.climatology_points).sum();
        info!(
            component = "climatology",
            event = "history.climatology.rolling_summary",
            window = *window,
            rows_missing,
            climatology_points
        );
        report.rolling_rows_missing.push((*window, rows_missing));
        means.push(FeatureColumn::new(
            rolling_mean_column(*window),
            stats.iter().map(|s| s.mean).collect(),
        ));
        stds.push(FeatureColumn::new(
            rolling_std_column(*window),
            stats.iter().map(|s| s.std).collect(),
        ));
    }
    for column in means.into_iter().chain(stds) {
        out = out.with_column(column)?;
    }

    Ok((out, report))
}

fn calendar_key(time: NaiveDateTime) -> CalendarKey {
    (time.month(), time.day(), time.hour())
}
