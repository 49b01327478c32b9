use std::sync::Arc;

use chrono::FixedOffset;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::backend::LlmRunner;
use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::models::{ActivityCard, TimedCard, TokenUsage};
use crate::parsing::{parse_card_synthesis, parse_merge_decision};
use crate::prompts::{merge_check_prompt, merge_synthesis_prompt};
use crate::utils::time::{format_epoch, offset_from_minutes};

use super::prompt_context;
use super::retry::{accept_all, run_with_retries, RetryPlan};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Why two cards were left apart.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "reason")]
pub enum KeepReason {
    Disabled,
    PreviousTooLong { minutes: f64 },
    GapTooWide { minutes: f64 },
    SpanTooLong { minutes: f64 },
    Declined { combine: bool, confidence: f64 },
    DecisionUnavailable,
    SynthesisUnavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// One card replacing both inputs.
    Merged(TimedCard),
    Kept(KeepReason),
}

#[derive(Debug, Clone)]
pub struct MergeResult {
    pub outcome: MergeOutcome,
    pub usage: TokenUsage,
}

/// Decides whether a new card continues the one before it, and if so writes
/// the combined card.
pub struct MergeEngine<R: LlmRunner + ?Sized> {
    runner: Arc<R>,
    config: Arc<GenerationConfig>,
    offset: FixedOffset,
}

impl<R: LlmRunner + ?Sized> MergeEngine<R> {
    pub fn new(runner: Arc<R>, config: Arc<GenerationConfig>) -> Self {
        let offset = offset_from_minutes(config.utc_offset_minutes);
        Self {
            runner,
            config,
            offset,
        }
    }

    /// Cheap checks that rule a merge out without asking the model.
    pub fn precheck(&self, previous: &TimedCard, candidate: &TimedCard) -> Option<KeepReason> {
        let merge = &self.config.merge;
        if !merge.enabled {
            return Some(KeepReason::Disabled);
        }

        let previous_minutes = previous.duration_minutes();
        if previous_minutes >= merge.skip_if_previous_minutes {
            return Some(KeepReason::PreviousTooLong {
                minutes: previous_minutes,
            });
        }

        let gap = (candidate.start_ts - previous.end_ts) as f64 / 60.0;
        if gap > merge.max_gap_minutes {
            return Some(KeepReason::GapTooWide { minutes: gap });
        }

        let span = merged_span_minutes(previous, candidate);
        if span > merge.max_merged_minutes {
            return Some(KeepReason::SpanTooLong { minutes: span });
        }

        None
    }

    pub async fn consider(
        &self,
        previous: &TimedCard,
        candidate: &TimedCard,
        cancel: &CancellationToken,
    ) -> Result<MergeResult, GenerationError> {
        if let Some(reason) = self.precheck(previous, candidate) {
            return Ok(MergeResult {
                outcome: MergeOutcome::Kept(reason),
                usage: TokenUsage::zero(),
            });
        }

        let mut usage = TokenUsage::zero();

        let decision = match run_with_retries(
            self.runner.as_ref(),
            RetryPlan {
                operation: "merge decision",
                base_prompt: merge_check_prompt(&previous.card, &candidate.card),
                images: &[],
                max_attempts: self.config.attempts.merge_decision,
            },
            cancel,
            parse_merge_decision,
            accept_all,
        )
        .await
        {
            Ok(generated) => {
                usage = usage.adding(generated.usage);
                generated.value
            }
            Err(err @ GenerationError::ExhaustedRetries { .. }) => {
                log_warn!("[merge] decision unavailable, keeping cards apart: {err}");
                return Ok(MergeResult {
                    outcome: MergeOutcome::Kept(KeepReason::DecisionUnavailable),
                    usage: usage.adding(err.usage()),
                });
            }
            Err(err) => return Err(err),
        };

        if !(decision.combine && decision.confidence >= self.config.merge.confidence_threshold) {
            log_info!(
                "[merge] declined (combine={}, confidence={:.2})",
                decision.combine,
                decision.confidence
            );
            return Ok(MergeResult {
                outcome: MergeOutcome::Kept(KeepReason::Declined {
                    combine: decision.combine,
                    confidence: decision.confidence,
                }),
                usage,
            });
        }

        let context = prompt_context(&self.config, self.offset);
        let synthesis = match run_with_retries(
            self.runner.as_ref(),
            RetryPlan {
                operation: "merge synthesis",
                base_prompt: merge_synthesis_prompt(&previous.card, &candidate.card, &context),
                images: &[],
                max_attempts: self.config.attempts.single_field,
            },
            cancel,
            parse_card_synthesis,
            accept_all,
        )
        .await
        {
            Ok(generated) => {
                usage = usage.adding(generated.usage);
                generated.value
            }
            Err(err @ GenerationError::ExhaustedRetries { .. }) => {
                log_warn!("[merge] synthesis unavailable, keeping cards apart: {err}");
                return Ok(MergeResult {
                    outcome: MergeOutcome::Kept(KeepReason::SynthesisUnavailable),
                    usage: usage.adding(err.usage()),
                });
            }
            Err(err) => return Err(err),
        };

        // Bounds come from the epoch timestamps, never from the display strings.
        // `precheck` has already held the span to the cap.
        let start_ts = previous.start_ts.min(candidate.start_ts);
        let end_ts = previous.end_ts.max(candidate.end_ts);

        let detailed_summary = synthesis
            .detailed_summary
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| join_details(&previous.card, &candidate.card));

        let merged = TimedCard {
            card: ActivityCard {
                start_time: format_epoch(start_ts, &self.offset),
                end_time: format_epoch(end_ts, &self.offset),
                category: previous.card.category.clone(),
                subcategory: previous.card.subcategory.clone(),
                title: synthesis.title.trim().to_string(),
                summary: synthesis.summary.trim().to_string(),
                detailed_summary,
                distractions: previous.card.distractions.clone(),
                app_sites: previous.card.app_sites.clone(),
            },
            start_ts,
            end_ts,
        };

        log_info!(
            "[merge] merged \"{}\" and \"{}\" into {} - {}",
            previous.card.title,
            candidate.card.title,
            merged.card.start_time,
            merged.card.end_time
        );

        Ok(MergeResult {
            outcome: MergeOutcome::Merged(merged),
            usage,
        })
    }
}

fn merged_span_minutes(previous: &TimedCard, candidate: &TimedCard) -> f64 {
    let start = previous.start_ts.min(candidate.start_ts);
    let end = previous.end_ts.max(candidate.end_ts);
    (end - start) as f64 / 60.0
}

fn join_details(previous: &ActivityCard, candidate: &ActivityCard) -> String {
    [previous, candidate]
        .iter()
        .map(|card| {
            if card.detailed_summary.is_empty() {
                card.summary.as_str()
            } else {
                card.detailed_summary.as_str()
            }
        })
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
