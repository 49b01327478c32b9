use serde::{Deserialize, Serialize};

/// Thresholds for judging a candidate card set against the timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationConfig {
    /// Uncovered stretches up to this long are tolerated (minutes)
    pub coverage_tolerance_minutes: f64,

    /// Every card but the last in a batch must last at least this long
    pub min_card_minutes: f64,

    /// ...and at most this long
    pub max_card_minutes: f64,

    /// Hard stop for the coverage sweep
    pub max_sweep_iterations: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            coverage_tolerance_minutes: 3.0,
            min_card_minutes: 10.0,
            max_card_minutes: 60.0,
            max_sweep_iterations: 10_000,
        }
    }
}
