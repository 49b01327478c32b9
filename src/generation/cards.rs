use std::sync::Arc;

use chrono::FixedOffset;
use tokio_util::sync::CancellationToken;

use crate::backend::LlmRunner;
use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::models::{ActivityCard, Observation};
use crate::parsing::parse_cards;
use crate::prompts::cards_prompt;
use crate::utils::observation_ranges;
use crate::utils::time::offset_from_minutes;
use crate::validation::validate_cards;

use super::retry::{run_with_retries, Generated, RetryPlan};
use super::{prompt_context, usable_observations};

/// Produces the revised card timeline for a window of observations.
pub struct CardGenerator<R: LlmRunner + ?Sized> {
    runner: Arc<R>,
    config: Arc<GenerationConfig>,
    offset: FixedOffset,
}

impl<R: LlmRunner + ?Sized> CardGenerator<R> {
    pub fn new(runner: Arc<R>, config: Arc<GenerationConfig>) -> Self {
        let offset = offset_from_minutes(config.utc_offset_minutes);
        Self {
            runner,
            config,
            offset,
        }
    }

    /// Ask for cards covering `observations` and everything `existing` covers.
    ///
    /// The returned set replaces `existing`. It has passed the coverage check
    /// against `existing` plus the observed time, and the duration check.
    pub async fn generate(
        &self,
        observations: &[Observation],
        existing: &[ActivityCard],
        cancel: &CancellationToken,
    ) -> Result<Generated<Vec<ActivityCard>>, GenerationError> {
        let observations = usable_observations(observations);
        if observations.is_empty() && existing.is_empty() {
            return Err(GenerationError::EmptyInput("no observations or cards"));
        }

        let validation = &self.config.validation;
        let observed = observation_ranges(&observations, &self.offset);
        let context = prompt_context(&self.config, self.offset);
        let base_prompt = cards_prompt(
            &observations,
            existing,
            &context,
            validation.min_card_minutes,
            validation.max_card_minutes,
        );

        run_with_retries(
            self.runner.as_ref(),
            RetryPlan {
                operation: "card generation",
                base_prompt,
                images: &[],
                max_attempts: self.config.attempts.cards,
            },
            cancel,
            parse_cards,
            |cards: &Vec<ActivityCard>| validate_cards(existing, &observed, cards, validation),
        )
        .await
    }
}
