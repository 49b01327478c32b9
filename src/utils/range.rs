use chrono::FixedOffset;

use crate::models::{ActivityCard, Observation};

use super::time::{parse_clock, seconds_of_day, SECONDS_PER_DAY};

pub const MINUTES_PER_DAY: f64 = (SECONDS_PER_DAY / 60) as f64;

/// A span in minutes from midnight. `end` may exceed a day when the span
/// crosses midnight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Project two time-of-day strings onto the minute axis.
    pub fn from_clock(start: &str, end: &str) -> Option<Self> {
        let start = f64::from(parse_clock(start)?) / 60.0;
        let mut end = f64::from(parse_clock(end)?) / 60.0;
        if end < start {
            end += MINUTES_PER_DAY;
        }
        Some(Self { start, end })
    }

    pub fn from_card(card: &ActivityCard) -> Option<Self> {
        Self::from_clock(&card.start_time, &card.end_time)
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether `minute` lies within this range widened by `slack` on both sides.
    pub fn contains_within(&self, minute: f64, slack: f64) -> bool {
        minute >= self.start - slack && minute <= self.end + slack
    }
}

/// Project every parseable card; cards with unreadable times are skipped.
pub fn card_ranges(cards: &[ActivityCard]) -> Vec<TimeRange> {
    cards.iter().filter_map(TimeRange::from_card).collect()
}

/// Project observations onto the minute axis of the earliest one's day.
///
/// Epoch timestamps are exact, so spans after midnight land past
/// `MINUTES_PER_DAY` without any guessing.
pub fn observation_ranges(observations: &[Observation], offset: &FixedOffset) -> Vec<TimeRange> {
    let Some(first) = observations.iter().map(|o| o.start_ts).min() else {
        return Vec::new();
    };
    let origin = f64::from(seconds_of_day(first, offset)) / 60.0;
    observations
        .iter()
        .map(|o| {
            TimeRange::new(
                origin + (o.start_ts - first) as f64 / 60.0,
                origin + (o.end_ts - first) as f64 / 60.0,
            )
        })
        .collect()
}

/// Sort and fold overlapping or touching ranges into maximal intervals.
pub fn merge_ranges(mut ranges: Vec<TimeRange>) -> Vec<TimeRange> {
    ranges.retain(|r| r.end >= r.start);
    ranges.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<TimeRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(current) if range.start <= current.end => {
                current.end = current.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}
