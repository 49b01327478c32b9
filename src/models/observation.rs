use serde::{Deserialize, Serialize};

/// A timestamped description of what was on screen over a short interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(default)]
    pub id: Option<i64>,
    pub batch_id: i64,
    pub start_ts: i64,
    pub end_ts: i64,
    pub text: String,
    #[serde(default)]
    pub source_model: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl Observation {
    pub fn new(batch_id: i64, start_ts: i64, end_ts: i64, text: impl Into<String>) -> Self {
        Self {
            id: None,
            batch_id,
            start_ts,
            end_ts,
            text: text.into(),
            source_model: None,
            created_at: None,
        }
    }

    pub fn duration_secs(&self) -> i64 {
        self.end_ts - self.start_ts
    }

    /// A positive span and some text. Generators drop anything else before prompting.
    pub fn is_well_formed(&self) -> bool {
        self.end_ts > self.start_ts && !self.text.trim().is_empty()
    }
}

/// Earliest start and latest end over a set of observations.
pub fn observation_bounds(observations: &[Observation]) -> Option<(i64, i64)> {
    let start = observations.iter().map(|o| o.start_ts).min()?;
    let end = observations.iter().map(|o| o.end_ts).max()?;
    Some((start, end))
}
