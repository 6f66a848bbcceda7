#![allow(dead_code)]

use std::cell::RefCell;

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use wxfeat::{DateRange, HttpFetcher, HttpResponse, SourceError};

pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    ymd(y, m, d).and_hms_opt(h, 0, 0).expect("valid time")
}

/// Serves an archive payload covering every hour of the requested range,
/// valued by `value_at`, and records the requested date ranges.
pub struct SyntheticArchive {
    pub value_at: fn(NaiveDateTime) -> Option<f64>,
    pub requests: RefCell<Vec<DateRange>>,
    pub status: u16,
}

impl SyntheticArchive {
    pub fn new(value_at: fn(NaiveDateTime) -> Option<f64>) -> Self {
        Self {
            value_at,
            requests: RefCell::new(Vec::new()),
            status: 200,
        }
    }
}

impl HttpFetcher for SyntheticArchive {
    fn get(&self, url: &reqwest::Url) -> Result<HttpResponse, SourceError> {
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.to_string())
                .unwrap_or_default()
        };
        let start = NaiveDate::parse_from_str(&param("start_date"), "%Y-%m-%d")
            .expect("start_date param");
        let end =
            NaiveDate::parse_from_str(&param("end_date"), "%Y-%m-%d").expect("end_date param");
        let range = DateRange::new(start, end);
        self.requests.borrow_mut().push(range);

        if self.status != 200 {
            return Ok(HttpResponse {
                status: self.status,
                body: "{\"error\":true,\"reason\":\"synthetic outage\"}".to_string(),
            });
        }

        let mut times = Vec::new();
        let mut values = Vec::new();
        let mut t = range.first_hour();
        while t <= range.last_hour() {
            times.push(format!("\"{}\"", t.format("%Y-%m-%dT%H:%M")));
            values.push(match (self.value_at)(t) {
                Some(v) => v.to_string(),
                None => "null".to_string(),
            });
            t += ChronoDuration::hours(1);
        }

        Ok(HttpResponse {
            status: 200,
            body: format!(
                "{{\"latitude\":35.88,\"longitude\":-78.79,\"timezone\":\"America/New_York\",\
                 \"hourly_units\":{{\"time\":\"iso8601\",\"temperature_2m\":\"°C\"}},\
                 \"hourly\":{{\"time\":[{}],\"temperature_2m\":[{}]}}}}",
                times.join(","),
                values.join(",")
            ),
        })
    }
}
