mod common;

use chrono::{NaiveDateTime, Timelike};
use common::{at, ymd, SyntheticArchive};
use wxfeat::{
    build_query_url, fetch_observations_with_fetcher, fetch_staging, year_chunks, Coordinates,
    DateRange, PipelineConfig, PipelineError, SourceConfig, SourceError, Variable, WeatherQuery,
};

fn query(range: DateRange) -> WeatherQuery {
    WeatherQuery {
        coordinates: Coordinates {
            latitude: 35.8776,
            longitude: -78.7875,
        },
        range,
        variables: vec![Variable::Temperature],
        timezone: "America/New_York".to_string(),
    }
}

fn skip_three_am(t: NaiveDateTime) -> Option<f64> {
    if t.hour() == 3 {
        None
    } else {
        Some(20.0)
    }
}

#[test]
fn chunked_fetch_matches_year_boundaries() {
    let cfg = PipelineConfig {
        history_range: DateRange::new(ymd(2024, 1, 1), ymd(2025, 9, 16)),
        ..PipelineConfig::default()
    };
    let archive = SyntheticArchive::new(|_| Some(18.0));

    let staging = fetch_staging(&cfg, &archive).expect("fetches");
    let requested: Vec<DateRange> = archive.requests.borrow().clone();
    let planned: Vec<DateRange> = year_chunks(ymd(2024, 1, 1), ymd(2025, 9, 16))
        .into_iter()
        .collect();

    assert_eq!(requested, planned);
    assert_eq!(
        requested,
        vec![
            DateRange::new(ymd(2024, 1, 1), ymd(2024, 12, 31)),
            DateRange::new(ymd(2025, 1, 1), ymd(2025, 9, 16)),
        ]
    );
    assert_eq!(staging.table.first_time(), Some(at(2024, 1, 1, 0)));
    assert_eq!(staging.table.last_time(), Some(at(2025, 9, 16, 23)));
    assert_eq!(
        staging.table.len() as u64,
        cfg.history_range.nominal_hours()
    );
}

#[test]
fn null_hours_are_dropped_and_reported_as_gaps() {
    let cfg = PipelineConfig {
        history_range: DateRange::new(ymd(2025, 3, 1), ymd(2025, 3, 2)),
        ..PipelineConfig::default()
    };
    let archive = SyntheticArchive::new(skip_three_am);

    let staging = fetch_staging(&cfg, &archive).expect("fetches");
    assert_eq!(staging.table.len(), 46);
    assert_eq!(staging.report.cadence.missing_hours, 2);
    assert_eq!(
        staging.report.cadence.gap_ranges,
        vec![
            (at(2025, 3, 1, 3), at(2025, 3, 1, 3)),
            (at(2025, 3, 2, 3), at(2025, 3, 2, 3)),
        ]
    );
}

#[test]
fn non_success_status_is_source_unavailable_with_payload() {
    let mut archive = SyntheticArchive::new(|_| Some(1.0));
    archive.status = 400;

    let err = fetch_observations_with_fetcher(
        &query(DateRange::new(ymd(2025, 9, 17), ymd(2025, 9, 30))),
        &SourceConfig::default(),
        &archive,
    )
    .expect_err("must fail");

    match err {
        SourceError::SourceUnavailable { status, body, .. } => {
            assert_eq!(status, 400);
            assert!(body.contains("synthetic outage"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn staging_fetch_stops_at_first_failing_chunk() {
    let cfg = PipelineConfig {
        history_range: DateRange::new(ymd(2023, 6, 1), ymd(2025, 1, 31)),
        ..PipelineConfig::default()
    };
    let mut archive = SyntheticArchive::new(|_| Some(1.0));
    archive.status = 503;

    let err = fetch_staging(&cfg, &archive).expect_err("must fail");
    assert!(matches!(
        err,
        PipelineError::Source(SourceError::SourceUnavailable { status: 503, .. })
    ));
    assert_eq!(archive.requests.borrow().len(), 1);
}

#[test]
fn invalid_timezone_is_rejected_before_any_request() {
    let archive = SyntheticArchive::new(|_| Some(1.0));
    let mut bad = query(DateRange::new(ymd(2025, 9, 17), ymd(2025, 9, 17)));
    bad.timezone = "Atlantis/Capital".to_string();

    let err = fetch_observations_with_fetcher(&bad, &SourceConfig::default(), &archive)
        .expect_err("must fail");
    assert!(matches!(err, SourceError::InvalidTimezone(_)));
    assert!(archive.requests.borrow().is_empty());
}

#[test]
fn query_url_lists_hourly_variables() {
    let mut q = query(DateRange::new(ymd(2025, 9, 17), ymd(2025, 9, 30)));
    q.variables = vec![Variable::Temperature, Variable::Humidity, Variable::Pressure];
    let url = build_query_url("https://archive-api.open-meteo.com/v1/archive", &q)
        .expect("url builds");

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    assert!(pairs.contains(&(
        "hourly".to_string(),
        "temperature_2m,relative_humidity_2m,pressure_msl".to_string()
    )));
    assert!(pairs.contains(&("start_date".to_string(), "2025-09-17".to_string())));
    assert!(pairs.contains(&("timezone".to_string(), "America/New_York".to_string())));
}
