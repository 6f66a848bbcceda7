//! Merge, de-duplication and cadence validation of fetched observation tables.

use chrono::{Duration as ChronoDuration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::table::{ObservationRow, ObservationTable, Variable};

const MAX_REPORTED_GAP_RANGES: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CadenceSummary {
    /// Consecutive deltas different from exactly one hour.
    pub anomalies: u64,
    pub missing_hours: u64,
    pub total_gap_ranges: u64,
    /// First and last missing hour of each gap, inclusive, capped at 256 entries.
    pub gap_ranges: Vec<(NaiveDateTime, NaiveDateTime)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeReport {
    pub input_rows: u64,
    pub output_rows: u64,
    pub duplicates_removed: u64,
    pub cadence: CadenceSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTable {
    pub table: ObservationTable,
    pub report: NormalizeReport,
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("no observations to normalize")]
    Empty,
    #[error("variable columns differ between tables: expected {expected:?}, found {found:?}")]
    VariableMismatch {
        expected: Vec<Variable>,
        found: Vec<Variable>,
    },
    #[error("timestamps not strictly increasing: {current} follows {previous}")]
    Monotonicity {
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },
    #[error("timestamp {time} is not on an hour boundary")]
    Cadence { time: NaiveDateTime },
}

/// Concatenates `raw_tables`, sorts by time, keeps the first row per timestamp
/// and validates the result. Gaps are reported, never filled.
pub fn normalize(raw_tables: Vec<ObservationTable>) -> Result<NormalizedTable, NormalizeError> {
    let variables = match raw_tables.first() {
        Some(table) => table.variables().to_vec(),
        None => return Err(NormalizeError::Empty),
    };

    let mut all_rows: Vec<ObservationRow> = Vec::new();
    for table in raw_tables {
        if table.variables() != variables.as_slice() {
            return Err(NormalizeError::VariableMismatch {
                expected: variables,
                found: table.variables().to_vec(),
            });
        }
        all_rows.append(&mut table.into_rows());
    }
    if all_rows.is_empty() {
        return Err(NormalizeError::Empty);
    }

    let input_rows = all_rows.len() as u64;
    all_rows.sort_by_key(|row| row.time);

    let mut deduped: Vec<ObservationRow> = Vec::with_capacity(all_rows.len());
    let mut duplicates_removed = 0u64;
    for row in all_rows {
        if deduped
            .last()
            .map(|existing| existing.time == row.time)
            .unwrap_or(false)
        {
            duplicates_removed += 1;
        } else {
            deduped.push(row);
        }
    }

    if duplicates_removed > 0 {
        warn!(
            component = "normalize",
            event = "normalize.duplicates_removed",
            duplicates_removed,
            likely_cause = "dst_fall_back"
        );
    }

    let table = ObservationTable::new(variables, deduped);
    let cadence = validate_table(&table)?;

    let report = NormalizeReport {
        input_rows,
        output_rows: table.len() as u64,
        duplicates_removed,
        cadence,
    };

    info!(
        component = "normalize",
        event = "normalize.finish",
        input_rows = report.input_rows,
        output_rows = report.output_rows,
        duplicates_removed = report.duplicates_removed,
        cadence_anomalies = report.cadence.anomalies,
        missing_hours = report.cadence.missing_hours,
        first_time = ?table.first_time(),
        last_time = ?table.last_time()
    );

    Ok(NormalizedTable { table, report })
}

/// Checks strict monotonicity and hour alignment without modifying the table.
///
/// Deltas other than one hour are counted as non-fatal anomalies.
pub fn validate_table(table: &ObservationTable) -> Result<CadenceSummary, NormalizeError> {
    let one_hour = ChronoDuration::hours(1);
    let mut summary = CadenceSummary::default();
    let mut previous: Option<NaiveDateTime> = None;

    for row in table.rows() {
        if !is_on_hour(row.time) {
            return Err(NormalizeError::Cadence { time: row.time });
        }
        if let Some(prev) = previous {
            if row.time <= prev {
                return Err(NormalizeError::Monotonicity {
                    previous: prev,
                    current: row.time,
                });
            }
            let delta = row.time - prev;
            if delta != one_hour {
                summary.anomalies += 1;
                let missing = (delta.num_hours() - 1).max(0) as u64;
                if missing > 0 {
                    summary.missing_hours += missing;
                    summary.total_gap_ranges += 1;
                    if summary.gap_ranges.len() < MAX_REPORTED_GAP_RANGES {
                        summary
                            .gap_ranges
                            .push((prev + one_hour, row.time - one_hour));
                    }
                }
            }
        }
        previous = Some(row.time);
    }

    if summary.anomalies > 0 {
        warn!(
            component = "normalize",
            event = "normalize.cadence_anomalies",
            anomalies = summary.anomalies,
            missing_hours = summary.missing_hours,
            total_gap_ranges = summary.total_gap_ranges
        );
    }

    Ok(summary)
}

fn is_on_hour(time: NaiveDateTime) -> bool {
    time.minute() == 0 && time.second() == 0 && time.nanosecond() == 0
}
