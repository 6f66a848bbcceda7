//! Column-oriented feature frames keyed by hourly timestamps.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::table::{ObservationTable, Variable};

/// Where an evaluation feature value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    Real,
    Climatology,
    Missing,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Climatology => "climatology",
            Self::Missing => "missing",
        }
    }
}

/// A feature value together with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourcedValue {
    pub value: Option<f64>,
    pub provenance: Provenance,
}

impl SourcedValue {
    pub fn real(value: f64) -> Self {
        Self {
            value: Some(value),
            provenance: Provenance::Real,
        }
    }

    pub fn climatology(value: f64) -> Self {
        Self {
            value: Some(value),
            provenance: Provenance::Climatology,
        }
    }

    pub fn missing() -> Self {
        Self {
            value: None,
            provenance: Provenance::Missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
    /// Per-row provenance, persisted as a `<name>_source` companion column.
    pub provenance: Option<Vec<Provenance>>,
}

impl FeatureColumn {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
            provenance: None,
        }
    }

    pub fn sourced(name: impl Into<String>, values: &[SourcedValue]) -> Self {
        Self {
            name: name.into(),
            values: values.iter().map(|v| v.value).collect(),
            provenance: Some(values.iter().map(|v| v.provenance).collect()),
        }
    }

    pub fn source_column_name(&self) -> String {
        format!("{}_source", self.name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("column '{column}' has {found} values, frame has {expected} rows")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("provenance of column '{column}' has {found} entries, expected {expected}")]
    ProvenanceLengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
}

/// Timestamps plus ordered, equally long feature columns.
///
/// Every transformation returns a new frame; nothing is edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    times: Vec<NaiveDateTime>,
    columns: Vec<FeatureColumn>,
}

impl FeatureFrame {
    pub fn new(times: Vec<NaiveDateTime>) -> Self {
        Self {
            times,
            columns: Vec::new(),
        }
    }

    /// Frame with the observed column of `variable`, or `None` when the table lacks it.
    pub fn from_observations(table: &ObservationTable, variable: Variable) -> Option<Self> {
        let observations = table.observations(variable)?;
        let times = observations.iter().map(|obs| obs.time).collect();
        let values = observations.iter().map(|obs| Some(obs.value)).collect();
        Some(Self {
            times,
            columns: vec![FeatureColumn::new(variable.column_name(), values)],
        })
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&FeatureColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn values(&self, name: &str) -> Option<&[Option<f64>]> {
        self.column(name).map(|c| c.values.as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Replaces a same-named column in place or appends a new one.
    pub fn with_column(mut self, column: FeatureColumn) -> Result<Self, FrameError> {
        if column.values.len() != self.times.len() {
            return Err(FrameError::LengthMismatch {
                column: column.name,
                expected: self.times.len(),
                found: column.values.len(),
            });
        }
        if let Some(provenance) = &column.provenance {
            if provenance.len() != self.times.len() {
                return Err(FrameError::ProvenanceLengthMismatch {
                    column: column.name,
                    expected: self.times.len(),
                    found: provenance.len(),
                });
            }
        }
        self.upsert(column);
        Ok(self)
    }

    /// Adds a column computed from each timestamp; lengths match by construction.
    pub(crate) fn with_time_column(
        mut self,
        name: impl Into<String>,
        value_at: impl Fn(NaiveDateTime) -> Option<f64>,
    ) -> Self {
        let values = self.times.iter().map(|t| value_at(*t)).collect();
        self.upsert(FeatureColumn::new(name, values));
        self
    }

    fn upsert(&mut self, column: FeatureColumn) {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
    }

    /// Keeps rows whose `keep` flag is set.
    pub fn filter_rows(&self, keep: &[bool]) -> Self {
        let times = self
            .times
            .iter()
            .zip(keep)
            .filter(|(_, k)| **k)
            .map(|(t, _)| *t)
            .collect();
        let columns = self
            .columns
            .iter()
            .map(|column| FeatureColumn {
                name: column.name.clone(),
                values: pick(&column.values, keep),
                provenance: column.provenance.as_ref().map(|p| pick(p, keep)),
            })
            .collect();
        Self { times, columns }
    }

    /// Rows with `start <= time <= end`.
    pub fn between(&self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let keep: Vec<bool> = self
            .times
            .iter()
            .map(|t| *t >= start && *t <= end)
            .collect();
        self.filter_rows(&keep)
    }

    /// Reorders columns: names listed in `order` first (skipping absent ones),
    /// then any remaining columns in their current order.
    pub fn reorder(&self, order: &[String]) -> Self {
        let mut columns = Vec::with_capacity(self.columns.len());
        for name in order {
            if let Some(column) = self.column(name) {
                columns.push(column.clone());
            }
        }
        for column in &self.columns {
            if !order.iter().any(|name| *name == column.name) {
                columns.push(column.clone());
            }
        }
        Self {
            times: self.times.clone(),
            columns,
        }
    }
}

fn pick<T: Copy>(values: &[T], keep: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(keep)
        .filter(|(_, k)| **k)
        .map(|(v, _)| *v)
        .collect()
}
