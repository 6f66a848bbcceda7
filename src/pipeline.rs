//! End-to-end stages shared by the binaries.

use std::path::PathBuf;

use chrono::Datelike;
use thiserror::Error;
use tracing::{info, warn};

use crate::assemble::{
    assemble_climatology_evaluation_frame, assemble_inference_frame,
    assemble_oracle_evaluation_frame, assemble_training_frame, AssembleError, AssembledFrame,
};
use crate::chunk::{year_chunks, DateRange};
use crate::climatology::{resolve_reference_years, ClimatologyIndex, ClimatologyReport};
use crate::config::{ConfigError, PipelineConfig};
use crate::frame::FeatureFrame;
use crate::history::FeatureError;
use crate::normalize::{normalize, NormalizeError, NormalizedTable};
use crate::persist::{write_staging_csv, PersistError};
use crate::source::{clip_to_range, fetch_observations_with_fetcher, HttpFetcher, SourceError};
use crate::table::{ObservationTable, Variable};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Fetches `range` one calendar year at a time, strictly in order, then
/// merges the chunks into one normalized table.
pub fn fetch_range(
    cfg: &PipelineConfig,
    range: DateRange,
    fetcher: &dyn HttpFetcher,
) -> Result<NormalizedTable, PipelineError> {
    let chunks = year_chunks(range.start, range.end);
    let mut tables = Vec::new();
    for chunk in &chunks {
        info!(
            component = "pipeline",
            event = "pipeline.chunk.start",
            start_date = %chunk.start,
            end_date = %chunk.end
        );
        let raw = fetch_observations_with_fetcher(&cfg.query_for(chunk), &cfg.source, fetcher)?;
        tables.push(clip_to_range(&raw, &chunk));
    }

    Ok(normalize(tables)?)
}

pub fn fetch_staging(
    cfg: &PipelineConfig,
    fetcher: &dyn HttpFetcher,
) -> Result<NormalizedTable, PipelineError> {
    fetch_range(cfg, cfg.history_range, fetcher)
}

/// Writes the fetched history twice: the range-named raw snapshot and the
/// fixed-name staging file the feature stages read. Returns `(raw, staging)`.
pub fn write_staging_outputs(
    cfg: &PipelineConfig,
    staging: &ObservationTable,
) -> Result<(PathBuf, PathBuf), PipelineError> {
    let raw_path = cfg.paths.raw_history_csv(&cfg.history_range);
    write_staging_csv(&raw_path, staging)?;
    let staging_path = cfg.paths.staging_csv();
    write_staging_csv(&staging_path, staging)?;
    Ok((raw_path, staging_path))
}

/// Fetches the evaluation range. A row count other than the nominal hour
/// count, or a first/last hour off the range bounds, is logged, not rejected.
pub fn fetch_test_set(
    cfg: &PipelineConfig,
    fetcher: &dyn HttpFetcher,
) -> Result<NormalizedTable, PipelineError> {
    let range = cfg.evaluation_range;
    let normalized = fetch_range(cfg, range, fetcher)?;
    let expected = range.nominal_hours();
    let actual = normalized.table.len() as u64;
    if actual != expected {
        warn!(
            component = "pipeline",
            event = "pipeline.test_set.row_count_mismatch",
            expected,
            actual
        );
    }

    let first = normalized.table.first_time();
    let last = normalized.table.last_time();
    if first != Some(range.first_hour()) || last != Some(range.last_hour()) {
        warn!(
            component = "pipeline",
            event = "pipeline.test_set.boundary_mismatch",
            expected_first = %range.first_hour(),
            expected_last = %range.last_hour(),
            actual_first = ?first,
            actual_last = ?last
        );
    }
    Ok(normalized)
}

pub fn build_training_features(
    cfg: &PipelineConfig,
    staging: &ObservationTable,
) -> Result<AssembledFrame, PipelineError> {
    let observed = observed_frame(staging, cfg.history.target)?;
    Ok(assemble_training_frame(
        &observed,
        &cfg.history,
        cfg.training_cutoff,
    )?)
}

pub fn build_inference_features(cfg: &PipelineConfig) -> Result<AssembledFrame, PipelineError> {
    Ok(assemble_inference_frame(&cfg.evaluation_range)?)
}

/// Evaluation features for the hours in `truth`, resolved against `history`
/// up to the training cutoff with climatology filling later hours.
pub fn build_climatology_evaluation(
    cfg: &PipelineConfig,
    history: &ObservationTable,
    truth: &ObservationTable,
) -> Result<(AssembledFrame, ClimatologyReport), PipelineError> {
    let visible = match history.first_time() {
        Some(first) => history.between(first, cfg.training_cutoff),
        None => history.clone(),
    };
    let reference_years = resolve_reference_years(
        &visible,
        cfg.climatology_reference_years.as_deref(),
        cfg.evaluation_range.start.year(),
    );
    let index = ClimatologyIndex::build(&visible, cfg.history.target, &reference_years)?;

    let truth = clip_to_range(truth, &cfg.evaluation_range);
    let truth_frame = observed_frame(&truth, cfg.history.target)?;
    Ok(assemble_climatology_evaluation_frame(
        &truth_frame,
        &index,
        &cfg.history,
    )?)
}

/// Oracle evaluation over `raw`, which must span `cfg.oracle_window`.
///
/// Lags and windows read observations inside the evaluated period.
pub fn build_oracle_evaluation(
    cfg: &PipelineConfig,
    raw: &ObservationTable,
) -> Result<AssembledFrame, PipelineError> {
    warn!(
        component = "pipeline",
        event = "pipeline.oracle.start",
        mode = "oracle",
        window_start = %cfg.oracle_window.start,
        window_end = %cfg.oracle_window.end,
        note = "features read future truth; not comparable to climatology evaluation"
    );
    let window = clip_to_range(raw, &cfg.oracle_window);
    let observed = observed_frame(&window, cfg.history.target)?;
    Ok(assemble_oracle_evaluation_frame(
        &observed,
        &cfg.history,
        &cfg.evaluation_range,
    )?)
}

fn observed_frame(table: &ObservationTable, target: Variable) -> Result<FeatureFrame, FeatureError> {
    FeatureFrame::from_observations(table, target)
        .ok_or_else(|| FeatureError::MissingTargetColumn(target.column_name().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::HttpResponse;
    use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
    use reqwest::Url;
    use std::cell::RefCell;

    /// Answers each request with every hour of its `start_date..end_date` at a constant value.
    struct HourlyFetcher {
        requests: RefCell<Vec<(String, String)>>,
    }

    impl HttpFetcher for HourlyFetcher {
        fn get(&self, url: &Url) -> Result<HttpResponse, SourceError> {
            let param = |name: &str| {
                url.query_pairs()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_default()
            };
            let start = NaiveDate::parse_from_str(&param("start_date"), "%Y-%m-%d")
                .expect("start date");
            let end =
                NaiveDate::parse_from_str(&param("end_date"), "%Y-%m-%d").expect("end date");
            self.requests
                .borrow_mut()
                .push((param("start_date"), param("end_date")));

            let range = DateRange::new(start, end);
            let mut times = Vec::new();
            let mut t = range.first_hour();
            while t <= range.last_hour() {
                times.push(format!("\"{}\"", t.format("%Y-%m-%dT%H:%M")));
                t += ChronoDuration::hours(1);
            }
            let values = vec!["12.5"; times.len()].join(",");
            Ok(HttpResponse {
                status: 200,
                body: format!(
                    "{{\"hourly\":{{\"time\":[{}],\"temperature_2m\":[{}]}}}}",
                    times.join(","),
                    values
                ),
            })
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn staging_fetch_walks_years_in_order() {
        let cfg = PipelineConfig {
            history_range: DateRange::new(ymd(2023, 12, 30), ymd(2024, 1, 2)),
            ..PipelineConfig::default()
        };
        let fetcher = HourlyFetcher {
            requests: RefCell::new(Vec::new()),
        };

        let staging = fetch_staging(&cfg, &fetcher).expect("fetches");
        assert_eq!(
            fetcher.requests.borrow().as_slice(),
            &[
                ("2023-12-30".to_string(), "2023-12-31".to_string()),
                ("2024-01-01".to_string(), "2024-01-02".to_string()),
            ]
        );
        assert_eq!(staging.table.len(), 4 * 24);
        assert_eq!(staging.report.duplicates_removed, 0);
    }

    #[test]
    fn climatology_evaluation_ignores_history_after_cutoff() {
        let cfg = PipelineConfig::default();
        let cutoff = cfg.training_cutoff;
        let series: Vec<(NaiveDateTime, f64)> = (-400..48)
            .map(|h| (cutoff + ChronoDuration::hours(h), h as f64))
            .collect();
        let history = ObservationTable::from_series(Variable::Temperature, &series);
        let truth = history.between(
            cfg.evaluation_range.first_hour(),
            cfg.evaluation_range.last_hour(),
        );

        let (assembled, _) =
            build_climatology_evaluation(&cfg, &history, &truth).expect("builds");
        let lag_1 = assembled.frame.column("temp_lag_1").expect("lag column");
        // First evaluated hour sees the cutoff observation; the next sees none.
        assert_eq!(lag_1.values[0], Some(0.0));
        assert_eq!(lag_1.values[1], None);
        assert_eq!(assembled.frame.len(), 47);
    }

    #[test]
    fn staging_outputs_write_raw_snapshot_and_staging_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = PipelineConfig {
            history_range: DateRange::new(ymd(2024, 12, 31), ymd(2025, 1, 1)),
            ..PipelineConfig::default()
        };
        cfg.paths.data_root = dir.path().to_path_buf();
        let fetcher = HourlyFetcher {
            requests: RefCell::new(Vec::new()),
        };
        let staging = fetch_staging(&cfg, &fetcher).expect("fetches");

        let (raw, staged) = write_staging_outputs(&cfg, &staging.table).expect("writes");
        assert_eq!(
            raw,
            dir.path()
                .join("raw")
                .join("openmeteo_rdu_2024-12-31_to_2025-01-01.csv")
        );
        assert_eq!(staged, cfg.paths.staging_csv());

        let raw_text = std::fs::read_to_string(&raw).expect("raw written");
        let staged_text = std::fs::read_to_string(&staged).expect("staging written");
        assert_eq!(raw_text, staged_text);
        assert_eq!(raw_text.lines().count(), 48 + 1);
    }
}
