pub mod cards;
pub mod frames;
pub mod local;
pub mod merge;
pub mod retry;

pub use cards::CardGenerator;
pub use frames::{FrameBatch, FrameObservations, FramePipeline};
pub use local::{LocalCard, LocalCardBuilder};
pub use merge::{KeepReason, MergeEngine, MergeOutcome, MergeResult};
pub use retry::{run_with_retries, AttemptPhase, AttemptState, Generated, RetryPlan};

use chrono::FixedOffset;

use crate::config::GenerationConfig;
use crate::models::Observation;
use crate::prompts::PromptContext;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub(crate) fn prompt_context(config: &GenerationConfig, offset: FixedOffset) -> PromptContext<'_> {
    PromptContext {
        categories: &config.categories,
        output_language: config.output_language.as_deref(),
        offset,
    }
}

/// Observations worth prompting with; empty or inverted ones are dropped.
pub(crate) fn usable_observations(observations: &[Observation]) -> Vec<Observation> {
    let usable: Vec<Observation> = observations
        .iter()
        .filter(|o| o.is_well_formed())
        .cloned()
        .collect();
    if usable.len() < observations.len() {
        log_warn!(
            "[generation] dropped {} malformed observation(s)",
            observations.len() - usable.len()
        );
    }
    usable
}
