//! Calendar-year chunking of inclusive date ranges.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Inclusive calendar-day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// `start` at 00:00 local civil time.
    pub fn first_hour(&self) -> NaiveDateTime {
        self.start.and_time(NaiveTime::MIN)
    }

    /// `end` at 23:00 local civil time.
    pub fn last_hour(&self) -> NaiveDateTime {
        self.end.and_time(NaiveTime::MIN) + chrono::Duration::hours(23)
    }

    /// Hours from `start 00:00` to `end 23:00` on a clock without DST shifts.
    pub fn nominal_hours(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        let days = (self.end - self.start).num_days() + 1;
        days as u64 * 24
    }
}

/// Restartable per-year split of a [`DateRange`].
///
/// Iterating borrows nothing and can be repeated; each pass yields the same
/// ordered, non-overlapping sub-ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearChunks {
    range: DateRange,
}

pub fn year_chunks(start: NaiveDate, end: NaiveDate) -> YearChunks {
    YearChunks {
        range: DateRange::new(start, end),
    }
}

impl YearChunks {
    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn iter(&self) -> YearChunkIter {
        YearChunkIter {
            range: self.range,
            next_year: if self.range.is_empty() {
                None
            } else {
                Some(self.range.start.year())
            },
        }
    }
}

impl IntoIterator for YearChunks {
    type Item = DateRange;
    type IntoIter = YearChunkIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for &YearChunks {
    type Item = DateRange;
    type IntoIter = YearChunkIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct YearChunkIter {
    range: DateRange,
    next_year: Option<i32>,
}

impl Iterator for YearChunkIter {
    type Item = DateRange;

    fn next(&mut self) -> Option<Self::Item> {
        let year = self.next_year?;
        if year > self.range.end.year() {
            self.next_year = None;
            return None;
        }

        let (year_start, year_end) = match (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                self.next_year = None;
                return None;
            }
        };

        self.next_year = if year < self.range.end.year() {
            Some(year + 1)
        } else {
            None
        };

        Some(DateRange {
            start: self.range.start.max(year_start),
            end: self.range.end.min(year_end),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn splits_partial_years_at_calendar_boundaries() {
        let chunks: Vec<DateRange> = year_chunks(date(2024, 1, 1), date(2025, 9, 16))
            .into_iter()
            .collect();

        assert_eq!(
            chunks,
            vec![
                DateRange::new(date(2024, 1, 1), date(2024, 12, 31)),
                DateRange::new(date(2025, 1, 1), date(2025, 9, 16)),
            ]
        );
    }

    #[test]
    fn range_inside_one_year_yields_single_chunk() {
        let chunks: Vec<DateRange> = year_chunks(date(2025, 8, 1), date(2025, 9, 30))
            .into_iter()
            .collect();
        assert_eq!(chunks, vec![DateRange::new(date(2025, 8, 1), date(2025, 9, 30))]);
    }

    #[test]
    fn inverted_range_yields_nothing() {
        assert_eq!(year_chunks(date(2025, 2, 1), date(2025, 1, 1)).iter().count(), 0);
    }

    #[test]
    fn chunk_sequence_is_restartable() {
        let chunks = year_chunks(date(2020, 3, 4), date(2023, 2, 1));
        let first: Vec<DateRange> = chunks.iter().collect();
        let second: Vec<DateRange> = (&chunks).into_iter().collect();
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
    }

    #[test]
    fn chunks_cover_every_day_exactly_once() {
        let range = DateRange::new(date(2019, 11, 20), date(2022, 2, 3));
        let mut seen = HashSet::new();
        for chunk in year_chunks(range.start, range.end) {
            let mut day = chunk.start;
            while day <= chunk.end {
                assert!(seen.insert(day), "day {day} appeared twice");
                day = day.succ_opt().expect("next day exists");
            }
        }

        let mut expected = HashSet::new();
        let mut day = range.start;
        while day <= range.end {
            expected.insert(day);
            day = day.succ_opt().expect("next day exists");
        }
        assert_eq!(seen, expected);
        assert_eq!(range.nominal_hours(), expected.len() as u64 * 24);
    }
}
