//! Deterministic calendar and cyclical features derived from the timestamp alone.

use std::f64::consts::PI;

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::frame::FeatureFrame;

pub const CALENDAR_COLUMNS: [&str; 7] = [
    "hour",
    "day_of_week",
    "is_weekend",
    "sin_hour",
    "cos_hour",
    "sin_doy",
    "cos_doy",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalendarFeatures {
    pub hour: u32,
    /// 0 = Monday .. 6 = Sunday.
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub sin_hour: f64,
    pub cos_hour: f64,
    pub sin_doy: f64,
    pub cos_doy: f64,
}

impl CalendarFeatures {
    fn as_values(&self) -> [f64; 7] {
        [
            self.hour as f64,
            self.day_of_week as f64,
            if self.is_weekend { 1.0 } else { 0.0 },
            self.sin_hour,
            self.cos_hour,
            self.sin_doy,
            self.cos_doy,
        ]
    }
}

pub fn calendar_features(time: NaiveDateTime) -> CalendarFeatures {
    let hour = time.hour();
    let day_of_week = time.weekday().num_days_from_monday();
    let hour_angle = 2.0 * PI * hour as f64 / 24.0;
    // Day 366 of leap years wraps slightly past a full turn; kept as-is.
    let doy_angle = 2.0 * PI * time.ordinal() as f64 / 365.0;

    CalendarFeatures {
        hour,
        day_of_week,
        is_weekend: day_of_week >= 5,
        sin_hour: hour_angle.sin(),
        cos_hour: hour_angle.cos(),
        sin_doy: doy_angle.sin(),
        cos_doy: doy_angle.cos(),
    }
}

/// Adds (or overwrites with identical values) the calendar columns.
pub fn add_calendar_features(frame: &FeatureFrame) -> FeatureFrame {
    let mut out = frame.clone();
    for (idx, name) in CALENDAR_COLUMNS.iter().enumerate() {
        out = out.with_time_column(*name, |time| Some(calendar_features(time).as_values()[idx]));
    }
    out
}
