use std::sync::Arc;

use chrono::FixedOffset;
use tokio_util::sync::CancellationToken;

use crate::backend::LlmRunner;
use crate::config::GenerationConfig;
use crate::error::{GenerationError, ValidationFailure};
use crate::models::{match_category, observation_bounds, ActivityCard, Observation, TimedCard, TokenUsage};
use crate::parsing::parse_text_field;
use crate::prompts::{category_prompt, summary_prompt, title_prompt};
use crate::utils::time::{format_epoch, offset_from_minutes};

use super::merge::{MergeEngine, MergeOutcome};
use super::{prompt_context, usable_observations};
use super::retry::{accept_all, run_with_retries, Generated, RetryPlan};

const MAX_TITLE_CHARS: usize = 80;

/// Result of building one card from a batch with a small local model.
#[derive(Debug, Clone)]
pub struct LocalCard {
    pub card: TimedCard,
    /// `card` replaces the previous card instead of following it.
    pub merged_with_previous: bool,
}

/// Builds a card field by field (summary, then title, then category) for
/// models too small to produce the full card JSON reliably.
pub struct LocalCardBuilder<R: LlmRunner + ?Sized> {
    runner: Arc<R>,
    config: Arc<GenerationConfig>,
    offset: FixedOffset,
    merger: MergeEngine<R>,
}

impl<R: LlmRunner + ?Sized> LocalCardBuilder<R> {
    pub fn new(runner: Arc<R>, config: Arc<GenerationConfig>) -> Self {
        let offset = offset_from_minutes(config.utc_offset_minutes);
        let merger = MergeEngine::new(Arc::clone(&runner), Arc::clone(&config));
        Self {
            runner,
            config,
            offset,
            merger,
        }
    }

    pub async fn build(
        &self,
        observations: &[Observation],
        previous: Option<&TimedCard>,
        cancel: &CancellationToken,
    ) -> Result<Generated<LocalCard>, GenerationError> {
        let observations = usable_observations(observations);
        let (start_ts, end_ts) =
            observation_bounds(&observations).ok_or(GenerationError::EmptyInput("no observations"))?;
        let context = prompt_context(&self.config, self.offset);
        let attempts = self.config.attempts.single_field;
        let mut usage = TokenUsage::zero();
        let mut calls = 0;

        let summary = run_with_retries(
            self.runner.as_ref(),
            RetryPlan {
                operation: "summary",
                base_prompt: summary_prompt(&observations, &context),
                images: &[],
                max_attempts: attempts,
            },
            cancel,
            |raw: &str| parse_text_field(raw, "summary"),
            accept_all,
        )
        .await?;
        usage = usage.adding(summary.usage);
        calls += summary.attempts;
        let summary = summary.value;

        let title = run_with_retries(
            self.runner.as_ref(),
            RetryPlan {
                operation: "title",
                base_prompt: title_prompt(&summary, &context),
                images: &[],
                max_attempts: attempts,
            },
            cancel,
            |raw: &str| parse_text_field(raw, "title"),
            |title: &String| {
                let chars = title.chars().count();
                if chars > MAX_TITLE_CHARS {
                    return Err(ValidationFailure::Field(format!(
                        "The title \"{title}\" is {chars} characters long. Reply with a title of at most {MAX_TITLE_CHARS} characters."
                    )));
                }
                Ok(())
            },
        )
        .await
        .map_err(|err| err.with_prior_usage(usage))?;
        usage = usage.adding(title.usage);
        calls += title.attempts;

        let categories = &self.config.categories;
        let category = run_with_retries(
            self.runner.as_ref(),
            RetryPlan {
                operation: "category",
                base_prompt: category_prompt(&summary, &context),
                images: &[],
                max_attempts: attempts,
            },
            cancel,
            |raw: &str| parse_text_field(raw, "category"),
            |name: &String| {
                if match_category(categories, name).is_some() {
                    return Ok(());
                }
                let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
                Err(ValidationFailure::Field(format!(
                    "\"{name}\" is not one of the categories. Reply with exactly one of: {}.",
                    names.join(", ")
                )))
            },
        )
        .await
        .map_err(|err| err.with_prior_usage(usage))?;
        usage = usage.adding(category.usage);
        calls += category.attempts;
        let category_name = match_category(categories, &category.value)
            .map(str::to_string)
            .unwrap_or(category.value);

        let card = TimedCard {
            card: ActivityCard {
                start_time: format_epoch(start_ts, &self.offset),
                end_time: format_epoch(end_ts, &self.offset),
                category: category_name,
                subcategory: String::new(),
                title: title.value,
                summary: summary.clone(),
                detailed_summary: summary,
                distractions: Vec::new(),
                app_sites: None,
            },
            start_ts,
            end_ts,
        };

        let Some(previous) = previous else {
            return Ok(Generated {
                value: LocalCard {
                    card,
                    merged_with_previous: false,
                },
                usage,
                attempts: calls,
            });
        };

        let merge = self
            .merger
            .consider(previous, &card, cancel)
            .await
            .map_err(|err| err.with_prior_usage(usage))?;
        usage = usage.adding(merge.usage);
        let value = match merge.outcome {
            MergeOutcome::Merged(merged) => LocalCard {
                card: merged,
                merged_with_previous: true,
            },
            MergeOutcome::Kept(_) => LocalCard {
                card,
                merged_with_previous: false,
            },
        };

        Ok(Generated {
            value,
            usage,
            attempts: calls,
        })
    }
}
