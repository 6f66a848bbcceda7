//! Open-Meteo hourly archive client.

use chrono::NaiveDateTime;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chunk::DateRange;
use crate::table::{parse_local_timestamp, ObservationRow, ObservationTable, Variable};

pub const OPEN_METEO_ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherQuery {
    pub coordinates: Coordinates,
    pub range: DateRange,
    pub variables: Vec<Variable>,
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    pub http_timeout_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: OPEN_METEO_ARCHIVE_URL.to_string(),
            http_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid weather query: {0}")]
    InvalidRequest(String),
    #[error("unknown IANA timezone '{0}'")]
    InvalidTimezone(String),
    #[error("HTTP client build error: {0}")]
    HttpClientBuild(String),
    #[error("HTTP transport failed for {url}: {message}")]
    Transport { url: String, message: String },
    #[error("weather source unavailable: HTTP {status} from {url}: {body}")]
    SourceUnavailable {
        url: String,
        status: u16,
        body: String,
    },
    #[error("malformed weather response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Transport seam; production uses [`ReqwestBlockingFetcher`].
pub trait HttpFetcher {
    fn get(&self, url: &Url) -> Result<HttpResponse, SourceError>;
}

pub struct ReqwestBlockingFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestBlockingFetcher {
    pub fn new(timeout_ms: u64) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| SourceError::HttpClientBuild(err.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpFetcher for ReqwestBlockingFetcher {
    fn get(&self, url: &Url) -> Result<HttpResponse, SourceError> {
        let response =
            self.client
                .get(url.clone())
                .send()
                .map_err(|err| SourceError::Transport {
                    url: url.to_string(),
                    message: err.to_string(),
                })?;

        let status = response.status().as_u16();
        let body = response.text().map_err(|err| SourceError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        })?;

        Ok(HttpResponse { status, body })
    }
}

/// Fetches one query with a fresh blocking client bounded by `cfg.http_timeout_ms`.
pub fn fetch_observations(
    query: &WeatherQuery,
    cfg: &SourceConfig,
) -> Result<ObservationTable, SourceError> {
    validate_query(query)?;
    let fetcher = ReqwestBlockingFetcher::new(cfg.http_timeout_ms)?;
    fetch_observations_with_fetcher(query, cfg, &fetcher)
}

pub fn fetch_observations_with_fetcher(
    query: &WeatherQuery,
    cfg: &SourceConfig,
    fetcher: &dyn HttpFetcher,
) -> Result<ObservationTable, SourceError> {
    validate_query(query)?;
    let url = build_query_url(&cfg.base_url, query)?;

    info!(
        component = "weather_source",
        event = "source.fetch.start",
        start_date = %query.range.start,
        end_date = %query.range.end,
        variables = %hourly_param(&query.variables),
        timezone = %query.timezone
    );
    debug!(
        component = "weather_source",
        event = "source.fetch.url",
        url = %url
    );

    let response = fetcher.get(&url)?;
    if !(200..300).contains(&response.status) {
        warn!(
            component = "weather_source",
            event = "source.fetch.unavailable",
            status = response.status,
            start_date = %query.range.start,
            end_date = %query.range.end
        );
        return Err(SourceError::SourceUnavailable {
            url: url.to_string(),
            status: response.status,
            body: response.body,
        });
    }

    let (table, null_rows_dropped) = parse_hourly_payload(&response.body, &query.variables)?;
    if null_rows_dropped > 0 {
        warn!(
            component = "weather_source",
            event = "source.fetch.null_rows_dropped",
            null_rows_dropped,
            start_date = %query.range.start,
            end_date = %query.range.end
        );
    }

    info!(
        component = "weather_source",
        event = "source.fetch.finish",
        rows = table.len(),
        null_rows_dropped,
        first_time = ?table.first_time(),
        last_time = ?table.last_time()
    );

    Ok(table)
}

/// Keeps rows from `range.start 00:00` through `range.end 23:00` inclusive.
pub fn clip_to_range(table: &ObservationTable, range: &DateRange) -> ObservationTable {
    table.between(range.first_hour(), range.last_hour())
}

pub fn build_query_url(base_url: &str, query: &WeatherQuery) -> Result<Url, SourceError> {
    let params = [
        ("latitude", query.coordinates.latitude.to_string()),
        ("longitude", query.coordinates.longitude.to_string()),
        ("start_date", query.range.start.format("%Y-%m-%d").to_string()),
        ("end_date", query.range.end.format("%Y-%m-%d").to_string()),
        ("hourly", hourly_param(&query.variables)),
        ("timezone", query.timezone.clone()),
    ];
    Url::parse_with_params(base_url, &params)
        .map_err(|err| SourceError::InvalidRequest(format!("invalid base url {base_url}: {err}")))
}

fn hourly_param(variables: &[Variable]) -> String {
    variables
        .iter()
        .map(|variable| variable.api_name())
        .collect::<Vec<_>>()
        .join(",")
}

fn validate_query(query: &WeatherQuery) -> Result<(), SourceError> {
    if query.variables.is_empty() {
        return Err(SourceError::InvalidRequest(
            "at least one hourly variable must be requested".to_string(),
        ));
    }
    if query.range.is_empty() {
        return Err(SourceError::InvalidRequest(format!(
            "end_date {} is before start_date {}",
            query.range.end, query.range.start
        )));
    }
    if query.timezone.parse::<chrono_tz::Tz>().is_err() {
        return Err(SourceError::InvalidTimezone(query.timezone.clone()));
    }
    Ok(())
}

fn parse_hourly_payload(
    body: &str,
    variables: &[Variable],
) -> Result<(ObservationTable, usize), SourceError> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|err| SourceError::MalformedResponse(format!("invalid JSON: {err}")))?;
    let hourly = payload
        .get("hourly")
        .and_then(Value::as_object)
        .ok_or_else(|| SourceError::MalformedResponse("missing `hourly` object".to_string()))?;
    let times = hourly
        .get("time")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::MalformedResponse("missing `hourly.time`".to_string()))?;

    let mut columns = Vec::with_capacity(variables.len());
    for variable in variables {
        let column = hourly
            .get(variable.api_name())
            .and_then(Value::as_array)
            .ok_or_else(|| {
                SourceError::MalformedResponse(format!("missing `hourly.{}`", variable.api_name()))
            })?;
        if column.len() != times.len() {
            return Err(SourceError::MalformedResponse(format!(
                "`hourly.{}` has {} entries, `hourly.time` has {}",
                variable.api_name(),
                column.len(),
                times.len()
            )));
        }
        columns.push(column);
    }

    let mut rows = Vec::with_capacity(times.len());
    let mut null_rows_dropped = 0usize;
    for (idx, raw_time) in times.iter().enumerate() {
        let time = parse_time_value(raw_time)?;
        let mut values = Vec::with_capacity(columns.len());
        for (variable, column) in variables.iter().zip(&columns) {
            match &column[idx] {
                Value::Null => break,
                value => values.push(value.as_f64().ok_or_else(|| {
                    SourceError::MalformedResponse(format!(
                        "non-numeric `hourly.{}` entry at {time}: {value}",
                        variable.api_name()
                    ))
                })?),
            }
        }
        if values.len() == columns.len() {
            rows.push(ObservationRow { time, values });
        } else {
            null_rows_dropped += 1;
        }
    }

    Ok((ObservationTable::new(variables.to_vec(), rows), null_rows_dropped))
}

fn parse_time_value(raw: &Value) -> Result<NaiveDateTime, SourceError> {
    raw.as_str()
        .and_then(parse_local_timestamp)
        .ok_or_else(|| SourceError::MalformedResponse(format!("unparseable timestamp {raw}")))
}
