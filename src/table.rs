//! Hourly observation tables shared by every pipeline stage.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Hourly variables the archive can be queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variable {
    Temperature,
    Humidity,
    Pressure,
    DewPoint,
}

pub const ALL_VARIABLES: [Variable; 4] = [
    Variable::Temperature,
    Variable::Humidity,
    Variable::Pressure,
    Variable::DewPoint,
];

impl Variable {
    /// Identifier used in the archive API (`hourly=` list and response keys).
    pub fn api_name(self) -> &'static str {
        match self {
            Self::Temperature => "temperature_2m",
            Self::Humidity => "relative_humidity_2m",
            Self::Pressure => "pressure_msl",
            Self::DewPoint => "dew_point_2m",
        }
    }

    /// Column header in staging tables and feature frames.
    pub fn column_name(self) -> &'static str {
        match self {
            Self::Temperature => "temp_obs",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
            Self::DewPoint => "dew_point",
        }
    }

    /// Prefix for derived lag/diff columns, e.g. `temp_lag_24`.
    pub fn feature_stem(self) -> &'static str {
        match self {
            Self::Temperature => "temp",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
            Self::DewPoint => "dew_point",
        }
    }

    pub fn from_column_name(raw: &str) -> Option<Self> {
        ALL_VARIABLES
            .into_iter()
            .find(|variable| variable.column_name() == raw || variable.api_name() == raw)
    }
}

/// One timestamped value of a single variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub time: NaiveDateTime,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub time: NaiveDateTime,
    /// Values in the same order as the owning table's `variables`.
    pub values: Vec<f64>,
}

/// Rows of naive local timestamps with one column per variable.
///
/// Construction does not enforce ordering; `normalize` produces the sorted,
/// duplicate-free form that the feature builders expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationTable {
    variables: Vec<Variable>,
    rows: Vec<ObservationRow>,
}

impl ObservationTable {
    pub fn new(variables: Vec<Variable>, rows: Vec<ObservationRow>) -> Self {
        Self { variables, rows }
    }

    pub fn empty(variables: Vec<Variable>) -> Self {
        Self {
            variables,
            rows: Vec::new(),
        }
    }

    /// Single-variable table from `(time, value)` pairs.
    pub fn from_series(variable: Variable, series: &[(NaiveDateTime, f64)]) -> Self {
        let rows = series
            .iter()
            .map(|(time, value)| ObservationRow {
                time: *time,
                values: vec![*value],
            })
            .collect();
        Self {
            variables: vec![variable],
            rows,
        }
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn rows(&self) -> &[ObservationRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<ObservationRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_time(&self) -> Option<NaiveDateTime> {
        self.rows.first().map(|row| row.time)
    }

    pub fn last_time(&self) -> Option<NaiveDateTime> {
        self.rows.last().map(|row| row.time)
    }

    pub fn column_index(&self, variable: Variable) -> Option<usize> {
        self.variables.iter().position(|v| *v == variable)
    }

    /// Observations of one variable in row order, or `None` if the table lacks it.
    pub fn observations(&self, variable: Variable) -> Option<Vec<Observation>> {
        let idx = self.column_index(variable)?;
        Some(
            self.rows
                .iter()
                .map(|row| Observation {
                    time: row.time,
                    value: row.values[idx],
                })
                .collect(),
        )
    }

    /// Rows with `start <= time <= end`.
    pub fn between(&self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            variables: self.variables.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| row.time >= start && row.time <= end)
                .cloned()
                .collect(),
        }
    }
}

/// Parses an archive (`2025-09-17T05:00`) or staging (`2025-09-17 05:00:00`) timestamp.
pub fn parse_local_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
}

pub fn format_local_timestamp(time: NaiveDateTime) -> String {
    time.format(TIMESTAMP_FORMATS[0]).to_string()
}
