mod config;
mod coverage;
mod duration;
mod segments;

pub use config::ValidationConfig;
pub use coverage::check_coverage;
pub use duration::check_durations;
pub use segments::check_segments;

use crate::error::ValidationFailure;
use crate::models::ActivityCard;
use crate::utils::TimeRange;

/// Both card checks. Coverage runs first; its diagnostic is the more useful
/// one to feed back when both fail.
pub fn validate_cards(
    previous: &[ActivityCard],
    observed: &[TimeRange],
    candidate: &[ActivityCard],
    config: &ValidationConfig,
) -> Result<(), ValidationFailure> {
    check_coverage(previous, observed, candidate, config)?;
    check_durations(candidate, config)
}
