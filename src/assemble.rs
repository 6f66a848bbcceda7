//! Feature frame assembly.
//!
//! Each frame kind selects its columns in persisted order, applies its
//! [`MissingPolicy`] and records a [`FeatureSchema`] whose fingerprint lets
//! training and evaluation frames be checked for compatibility. Inference
//! frames are refused when any observed column is present.

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::calendar::{add_calendar_features, CALENDAR_COLUMNS};
use crate::chunk::DateRange;
use crate::climatology::{add_climatology_history_features, ClimatologyIndex, ClimatologyReport};
use crate::frame::{FeatureColumn, FeatureFrame, FrameError};
use crate::history::{add_history_features, history_columns, FeatureError, HistoryFeatureConfig};
use crate::table::ALL_VARIABLES;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    Training,
    Inference,
    ClimatologyEvaluation,
    /// Lags computed on a window that includes the evaluated hours.
    OracleEvaluation,
}

impl FrameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Inference => "inference",
            Self::ClimatologyEvaluation => "climatology",
            Self::OracleEvaluation => "oracle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingPolicy {
    /// Drop any row with a missing required feature.
    Drop,
    /// Keep every row; missing cells stay empty.
    Keep,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<String>,
}

impl FeatureSchema {
    pub fn for_columns(columns: &[String]) -> Self {
        Self {
            version: FEATURE_SCHEMA_VERSION,
            fingerprint: schema_fingerprint(FEATURE_SCHEMA_VERSION, columns),
            columns: columns.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembleReport {
    pub kind: FrameKind,
    pub input_rows: u64,
    pub output_rows: u64,
    pub dropped_rows: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledFrame {
    pub kind: FrameKind,
    pub frame: FeatureFrame,
    pub schema: FeatureSchema,
    pub report: AssembleReport,
}

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("insufficient history: {0}")]
    InsufficientHistory(String),
    #[error("observed-value column '{column}' present in an inference frame")]
    Leakage { column: String },
    #[error("required feature column '{0}' is missing")]
    MissingColumn(String),
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaFingerprintMismatch { expected: String, actual: String },
}

/// Ordered columns of a frame with observed values: observed, calendar, history.
pub fn training_columns(cfg: &HistoryFeatureConfig) -> Vec<String> {
    let mut columns = vec![cfg.target.column_name().to_string()];
    columns.extend(CALENDAR_COLUMNS.iter().map(|c| c.to_string()));
    columns.extend(history_columns(cfg));
    columns
}

pub fn inference_columns() -> Vec<String> {
    CALENDAR_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// Fails with [`AssembleError::Leakage`] when `frame` holds any observed or raw API value column.
pub fn check_no_leakage(frame: &FeatureFrame) -> Result<(), AssembleError> {
    for variable in ALL_VARIABLES {
        for name in [variable.column_name(), variable.api_name()] {
            if frame.has_column(name) {
                return Err(AssembleError::Leakage {
                    column: name.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Builds the training table from an observed-value frame.
///
/// Rows after `cutoff` are discarded before any feature is derived, so no
/// feature can read them.
pub fn assemble_training_frame(
    observed: &FeatureFrame,
    cfg: &HistoryFeatureConfig,
    cutoff: NaiveDateTime,
) -> Result<AssembledFrame, AssembleError> {
    let keep: Vec<bool> = observed.times().iter().map(|t| *t <= cutoff).collect();
    let clipped = observed.filter_rows(&keep);
    if clipped.is_empty() {
        return Err(AssembleError::InsufficientHistory(format!(
            "no observations at or before cutoff {cutoff}"
        )));
    }

    let featured = add_history_features(&add_calendar_features(&clipped), cfg)?;
    let assembled = finish(
        FrameKind::Training,
        &featured,
        &training_columns(cfg),
        MissingPolicy::Drop,
    )?;
    if assembled.frame.is_empty() {
        return Err(AssembleError::InsufficientHistory(format!(
            "all {} rows before cutoff {cutoff} lack complete lag/rolling history",
            clipped.len()
        )));
    }
    Ok(assembled)
}

/// Hourly calendar-only frame from `range.start` 00:00 to `range.end` 23:00.
pub fn assemble_inference_frame(range: &DateRange) -> Result<AssembledFrame, AssembleError> {
    let times = hourly_times(range.first_hour(), range.last_hour());
    let frame = add_calendar_features(&FeatureFrame::new(times));
    check_no_leakage(&frame)?;
    finish(
        FrameKind::Inference,
        &frame,
        &inference_columns(),
        MissingPolicy::Drop,
    )
}

/// Evaluation rows for the hours of `truth` with history features resolved
/// through `index`. Rows with unresolved features are kept; their lag sources
/// read `missing`.
pub fn assemble_climatology_evaluation_frame(
    truth: &FeatureFrame,
    index: &ClimatologyIndex,
    cfg: &HistoryFeatureConfig,
) -> Result<(AssembledFrame, ClimatologyReport), AssembleError> {
    let calendar = add_calendar_features(truth);
    let (featured, report) = add_climatology_history_features(&calendar, index, cfg)?;
    let assembled = finish(
        FrameKind::ClimatologyEvaluation,
        &featured,
        &training_columns(cfg),
        MissingPolicy::Keep,
    )?;
    info!(
        component = "assemble",
        event = "history.climatology.summary",
        rows = assembled.frame.len(),
        reference_years = ?index.reference_years(),
        lags = ?report.lags,
        rolling_rows_missing = ?report.rolling_rows_missing
    );
    Ok((assembled, report))
}

/// Training-style features computed over `observed` (which spans the
/// evaluated hours), then sliced to `range`. Uses future truth.
pub fn assemble_oracle_evaluation_frame(
    observed: &FeatureFrame,
    cfg: &HistoryFeatureConfig,
    range: &DateRange,
) -> Result<AssembledFrame, AssembleError> {
    let featured = add_history_features(&add_calendar_features(observed), cfg)?;
    let sliced = featured.between(range.first_hour(), range.last_hour());
    let assembled = finish(
        FrameKind::OracleEvaluation,
        &sliced,
        &training_columns(cfg),
        MissingPolicy::Drop,
    )?;
    if assembled.frame.is_empty() {
        return Err(AssembleError::InsufficientHistory(format!(
            "oracle window yields no complete rows in {}..{}",
            range.start, range.end
        )));
    }
    Ok(assembled)
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), AssembleError> {
    if expected_version != actual.version {
        return Err(AssembleError::SchemaVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(AssembleError::SchemaFingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

fn finish(
    kind: FrameKind,
    featured: &FeatureFrame,
    columns: &[String],
    policy: MissingPolicy,
) -> Result<AssembledFrame, AssembleError> {
    let mut selected = FeatureFrame::new(featured.times().to_vec());
    for name in columns {
        let column: &FeatureColumn = featured
            .column(name)
            .ok_or_else(|| AssembleError::MissingColumn(name.clone()))?;
        selected = selected.with_column(column.clone())?;
    }

    let frame = match policy {
        MissingPolicy::Keep => selected,
        MissingPolicy::Drop => {
            let keep: Vec<bool> = (0..selected.len())
                .map(|i| selected.columns().iter().all(|c| c.values[i].is_some()))
                .collect();
            selected.filter_rows(&keep)
        }
    };

    let report = AssembleReport {
        kind,
        input_rows: featured.len() as u64,
        output_rows: frame.len() as u64,
        dropped_rows: (featured.len() - frame.len()) as u64,
    };
    let schema = FeatureSchema::for_columns(columns);

    info!(
        component = "assemble",
        event = "assemble.finish",
        kind = kind.as_str(),
        input_rows = report.input_rows,
        output_rows = report.output_rows,
        dropped_rows = report.dropped_rows,
        first_time = ?frame.times().first(),
        last_time = ?frame.times().last(),
        fingerprint = %schema.fingerprint
    );

    Ok(AssembledFrame {
        kind,
        frame,
        schema,
        report,
    })
}

fn hourly_times(first: NaiveDateTime, last: NaiveDateTime) -> Vec<NaiveDateTime> {
    let mut times = Vec::new();
    let mut current = first;
    while current <= last {
        times.push(current);
        current += ChronoDuration::hours(1);
    }
    times
}

fn schema_fingerprint(version: u32, columns: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{version};"));
    hasher.update("columns:");
    for column in columns {
        hasher.update(column.as_bytes());
        hasher.update(":f64;");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{ObservationTable, Variable};
    use chrono::NaiveDate;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn observed(start: NaiveDateTime, values: &[f64]) -> FeatureFrame {
        let series: Vec<(NaiveDateTime, f64)> = values
            .iter()
            .enumerate()
            .map(|(i, v)| (start + ChronoDuration::hours(i as i64), *v))
            .collect();
        let table = ObservationTable::from_series(Variable::Temperature, &series);
        FeatureFrame::from_observations(&table, Variable::Temperature).expect("column present")
    }

    #[test]
    fn training_frame_drops_warmup_rows_and_orders_columns() {
        let start = day(2025, 1, 1).and_hms_opt(0, 0, 0).expect("valid time");
        let values: Vec<f64> = (0..400).map(|i| i as f64).collect();
        let frame = observed(start, &values);
        let cfg = HistoryFeatureConfig::default();

        let assembled = assemble_training_frame(&frame, &cfg, start + ChronoDuration::hours(399))
            .expect("assembles");
        assert_eq!(assembled.frame.len(), 400 - 168);
        assert_eq!(assembled.report.dropped_rows, 168);
        assert_eq!(assembled.frame.column_names()[0], "temp_obs");
        assert_eq!(assembled.schema.columns, training_columns(&cfg));
        assert_eq!(assembled.frame.times()[0], start + ChronoDuration::hours(168));
    }

    #[test]
    fn cutoff_before_history_is_insufficient() {
        let start = day(2025, 1, 1).and_hms_opt(0, 0, 0).expect("valid time");
        let frame = observed(start, &[1.0, 2.0, 3.0]);
        let cfg = HistoryFeatureConfig::default();

        let before = assemble_training_frame(&frame, &cfg, start - ChronoDuration::hours(1));
        assert!(matches!(before, Err(AssembleError::InsufficientHistory(_))));

        let too_short = assemble_training_frame(&frame, &cfg, start + ChronoDuration::hours(2));
        assert!(matches!(too_short, Err(AssembleError::InsufficientHistory(_))));
    }

    #[test]
    fn inference_frame_covers_full_days_without_observed_columns() {
        let range = DateRange::new(day(2025, 9, 17), day(2025, 9, 30));
        let assembled = assemble_inference_frame(&range).expect("assembles");

        assert_eq!(assembled.frame.len(), 336);
        assert_eq!(assembled.frame.column_names(), CALENDAR_COLUMNS.to_vec());
        assert!(check_no_leakage(&assembled.frame).is_ok());
    }

    #[test]
    fn observed_or_api_columns_are_leakage() {
        let start = day(2025, 9, 17).and_hms_opt(0, 0, 0).expect("valid time");
        let frame = observed(start, &[20.0]);
        assert!(matches!(
            check_no_leakage(&frame),
            Err(AssembleError::Leakage { column }) if column == "temp_obs"
        ));

        let api = FeatureFrame::new(vec![start])
            .with_column(FeatureColumn::new("relative_humidity_2m", vec![Some(50.0)]))
            .expect("lengths match");
        assert!(matches!(
            check_no_leakage(&api),
            Err(AssembleError::Leakage { .. })
        ));
    }

    #[test]
    fn schema_fingerprint_tracks_columns() {
        let cfg = HistoryFeatureConfig::default();
        let training = FeatureSchema::for_columns(&training_columns(&cfg));
        assert_eq!(training.fingerprint.len(), 64);
        assert!(
            assert_schema_compatible(FEATURE_SCHEMA_VERSION, &training.fingerprint, &training)
                .is_ok()
        );

        let inference = FeatureSchema::for_columns(&inference_columns());
        assert!(matches!(
            assert_schema_compatible(FEATURE_SCHEMA_VERSION, &training.fingerprint, &inference),
            Err(AssembleError::SchemaFingerprintMismatch { .. })
        ));
        assert!(matches!(
            assert_schema_compatible(2, &training.fingerprint, &training),
            Err(AssembleError::SchemaVersionMismatch { expected: 2, actual: 1 })
        ));
    }
}
