use serde::{Deserialize, Serialize};

use crate::utils::time::clock_duration_minutes;

/// A brief interruption nested inside a card's span.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Distraction {
    pub start_time: String,
    pub end_time: String,
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSites {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
}

/// One coherent segment of user activity on the timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCard {
    pub start_time: String,
    pub end_time: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub detailed_summary: String,
    #[serde(default)]
    pub distractions: Vec<Distraction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_sites: Option<AppSites>,
}

impl ActivityCard {
    /// Length in minutes, or `None` when either bound does not parse.
    pub fn duration_minutes(&self) -> Option<f64> {
        clock_duration_minutes(&self.start_time, &self.end_time)
    }

    #[cfg(test)]
    pub(crate) fn placeholder(start: &str, end: &str) -> Self {
        Self {
            start_time: start.to_string(),
            end_time: end.to_string(),
            category: "Work".to_string(),
            subcategory: String::new(),
            title: format!("{start} - {end}"),
            summary: "placeholder".to_string(),
            detailed_summary: String::new(),
            distractions: Vec::new(),
            app_sites: None,
        }
    }
}

/// A card plus the epoch bounds it was generated from.
///
/// Merges take their span from these bounds; the display strings are never
/// parsed back, which keeps midnight-crossing spans correct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimedCard {
    pub card: ActivityCard,
    pub start_ts: i64,
    pub end_ts: i64,
}

impl TimedCard {
    pub fn duration_minutes(&self) -> f64 {
        (self.end_ts - self.start_ts) as f64 / 60.0
    }
}
