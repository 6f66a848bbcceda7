//! CSV persistence for staging tables and feature frames.

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use csv::StringRecord;
use thiserror::Error;
use tracing::{debug, info};

use crate::frame::FeatureFrame;
use crate::table::{
    format_local_timestamp, parse_local_timestamp, ObservationRow, ObservationTable, Variable,
};

pub const TIME_COLUMN: &str = "time";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid output path: {0}")]
    InvalidPath(PathBuf),
    #[error("{path} has no '{column}' column")]
    MissingColumn { path: PathBuf, column: String },
    #[error("{path} has no known variable columns")]
    NoVariableColumns { path: PathBuf },
    #[error("failed to parse {field} value '{value}' on line {line}")]
    ParseField {
        field: String,
        value: String,
        line: u64,
    },
}

pub fn write_staging_csv(path: &Path, table: &ObservationTable) -> Result<(), PersistError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec![TIME_COLUMN.to_string()];
    header.extend(table.variables().iter().map(|v| v.column_name().to_string()));
    writer.write_record(&header)?;

    for row in table.rows() {
        let mut record = Vec::with_capacity(row.values.len() + 1);
        record.push(format_local_timestamp(row.time));
        record.extend(row.values.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }

    let bytes = finish_writer(writer)?;
    write_atomic(path, &bytes)?;
    info!(
        component = "persist",
        event = "persist.staging.written",
        path = %path.display(),
        rows = table.len()
    );
    Ok(())
}

/// Reads a staging CSV. Columns that are not a known variable are skipped.
///
/// Row order is preserved as written; callers validate it with
/// [`validate_table`](crate::validate_table).
pub fn read_staging_csv(path: &Path) -> Result<ObservationTable, PersistError> {
    let bytes = fs::read(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(Cursor::new(bytes));
    let headers = reader.headers()?.clone();

    let time_idx = headers
        .iter()
        .position(|h| h.trim() == TIME_COLUMN)
        .ok_or_else(|| PersistError::MissingColumn {
            path: path.to_path_buf(),
            column: TIME_COLUMN.to_string(),
        })?;

    let mut variables = Vec::new();
    let mut indices = Vec::new();
    for (idx, header) in headers.iter().enumerate() {
        if idx == time_idx {
            continue;
        }
        match Variable::from_column_name(header.trim()) {
            Some(variable) if !variables.contains(&variable) => {
                variables.push(variable);
                indices.push(idx);
            }
            _ => debug!(
                component = "persist",
                event = "persist.staging.column_skipped",
                column = header
            ),
        }
    }
    if variables.is_empty() {
        return Err(PersistError::NoVariableColumns {
            path: path.to_path_buf(),
        });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(parse_staging_record(&record, time_idx, &variables, &indices)?);
    }

    Ok(ObservationTable::new(variables, rows))
}

/// Writes `time` followed by every column of `frame`. A column carrying
/// provenance is followed by its `<name>_source` column. Missing values are
/// empty cells.
pub fn write_feature_csv(path: &Path, frame: &FeatureFrame) -> Result<(), PersistError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(feature_csv_header(frame))?;

    for (row_idx, time) in frame.times().iter().enumerate() {
        let mut record = vec![format_local_timestamp(*time)];
        for column in frame.columns() {
            record.push(
                column.values[row_idx]
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
            if let Some(provenance) = &column.provenance {
                record.push(provenance[row_idx].as_str().to_string());
            }
        }
        writer.write_record(&record)?;
    }

    let bytes = finish_writer(writer)?;
    write_atomic(path, &bytes)?;
    info!(
        component = "persist",
        event = "persist.features.written",
        path = %path.display(),
        rows = frame.len(),
        columns = frame.columns().len()
    );
    Ok(())
}

pub fn feature_csv_header(frame: &FeatureFrame) -> Vec<String> {
    let mut header = vec![TIME_COLUMN.to_string()];
    for column in frame.columns() {
        header.push(column.name.clone());
        if column.provenance.is_some() {
            header.push(column.source_column_name());
        }
    }
    header
}

fn parse_staging_record(
    record: &StringRecord,
    time_idx: usize,
    variables: &[Variable],
    indices: &[usize],
) -> Result<ObservationRow, PersistError> {
    let line = record.position().map(|p| p.line()).unwrap_or_default();
    let raw_time = record.get(time_idx).unwrap_or_default();
    let time = parse_local_timestamp(raw_time).ok_or_else(|| PersistError::ParseField {
        field: TIME_COLUMN.to_string(),
        value: raw_time.to_string(),
        line,
    })?;

    let mut values = Vec::with_capacity(indices.len());
    for (variable, idx) in variables.iter().zip(indices) {
        let raw = record.get(*idx).unwrap_or_default();
        let value = raw
            .trim()
            .parse::<f64>()
            .map_err(|_| PersistError::ParseField {
                field: variable.column_name().to_string(),
                value: raw.to_string(),
                line,
            })?;
        values.push(value);
    }

    Ok(ObservationRow { time, values })
}

fn finish_writer(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, PersistError> {
    writer
        .into_inner()
        .map_err(|err| PersistError::Io(err.into_error()))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| PersistError::InvalidPath(path.to_path_buf()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}
