use std::path::PathBuf;
use std::sync::Arc;

use chrono::{FixedOffset, Utc};
use tokio_util::sync::CancellationToken;

use crate::backend::LlmRunner;
use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::models::{Frame, FrameDescription, Observation, TokenUsage, VideoSegment};
use crate::parsing::{parse_frame_descriptions, parse_segments};
use crate::prompts::{frame_description_prompt, segment_merge_prompt};
use crate::utils::time::offset_from_minutes;
use crate::validation::check_segments;

use super::prompt_context;
use super::retry::{accept_all, run_with_retries, Generated, RetryPlan};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const FALLBACK_TEXT: &str = "Screen activity (no description available)";

/// Observations for one batch, and whether they came from the fallback.
#[derive(Debug, Clone)]
pub struct FrameObservations {
    pub observations: Vec<Observation>,
    pub fell_back: bool,
}

/// A batch of screenshots to turn into observations.
#[derive(Debug, Clone)]
pub struct FrameBatch {
    pub batch_id: i64,
    /// Epoch seconds of offset zero.
    pub start_ts: i64,
    /// Recording length; `None` means the last frame plus one fallback interval.
    pub duration_secs: Option<f64>,
    pub frames: Vec<Frame>,
}

/// Describes frames in chunks, groups the descriptions into segments, and
/// converts the segments into observations.
pub struct FramePipeline<R: LlmRunner + ?Sized> {
    runner: Arc<R>,
    config: Arc<GenerationConfig>,
    offset: FixedOffset,
}

impl<R: LlmRunner + ?Sized> FramePipeline<R> {
    pub fn new(runner: Arc<R>, config: Arc<GenerationConfig>) -> Self {
        let offset = offset_from_minutes(config.utc_offset_minutes);
        Self {
            runner,
            config,
            offset,
        }
    }

    /// Never fails on model output: when description or segment merging runs
    /// out of attempts, one observation per frame is synthesized instead.
    /// Only a missing backend, cancellation, or an empty batch are errors.
    pub async fn observe(
        &self,
        batch: &FrameBatch,
        cancel: &CancellationToken,
    ) -> Result<Generated<FrameObservations>, GenerationError> {
        if batch.frames.is_empty() {
            return Err(GenerationError::EmptyInput("no frames"));
        }

        let duration = self.batch_duration(batch);
        let mut usage = TokenUsage::zero();
        let mut calls = 0;
        let mut descriptions: Vec<FrameDescription> = Vec::with_capacity(batch.frames.len());

        for chunk in batch.frames.chunks(self.config.frames.frames_per_call.max(1)) {
            match self.describe_chunk(chunk, cancel).await {
                Ok(generated) => {
                    usage = usage.adding(generated.usage);
                    calls += generated.attempts;
                    descriptions.extend(generated.value);
                }
                Err(err @ GenerationError::ExhaustedRetries { .. }) => {
                    usage = usage.adding(err.usage());
                    log_warn!(
                        "[frames] batch {} description failed, using fallback: {err}",
                        batch.batch_id
                    );
                    return Ok(self.fallback(batch, &descriptions, usage, calls));
                }
                Err(err) => return Err(err),
            }
        }

        let context = prompt_context(&self.config, self.offset);
        let slack = self.config.frames.segment_slack_secs;
        let segments = match run_with_retries(
            self.runner.as_ref(),
            RetryPlan {
                operation: "segment merge",
                base_prompt: segment_merge_prompt(&descriptions, duration, &context),
                images: &[],
                max_attempts: self.config.attempts.segments,
            },
            cancel,
            parse_segments,
            |segments: &Vec<VideoSegment>| check_segments(segments, duration, slack),
        )
        .await
        {
            Ok(generated) => {
                usage = usage.adding(generated.usage);
                calls += generated.attempts;
                generated.value
            }
            Err(err @ GenerationError::ExhaustedRetries { .. }) => {
                usage = usage.adding(err.usage());
                log_warn!(
                    "[frames] batch {} segment merge failed, using fallback: {err}",
                    batch.batch_id
                );
                return Ok(self.fallback(batch, &descriptions, usage, calls));
            }
            Err(err) => return Err(err),
        };

        let source = self.runner.label();
        let created_at = Utc::now().timestamp();
        let batch_end = batch.start_ts + duration.round() as i64;
        let observations: Vec<Observation> = segments
            .iter()
            .map(|segment| {
                let start = batch.start_ts + segment.start_secs.max(0.0).round() as i64;
                let end = (batch.start_ts + segment.end_secs.round() as i64).min(batch_end);
                Observation {
                    source_model: Some(source.clone()),
                    created_at: Some(created_at),
                    ..Observation::new(batch.batch_id, start, end.max(start + 1), segment.description.trim())
                }
            })
            .collect();

        log_info!(
            "[frames] batch {}: {} frame(s) -> {} observation(s)",
            batch.batch_id,
            batch.frames.len(),
            observations.len()
        );

        Ok(Generated {
            value: FrameObservations {
                observations,
                fell_back: false,
            },
            usage,
            attempts: calls,
        })
    }

    async fn describe_chunk(
        &self,
        chunk: &[Frame],
        cancel: &CancellationToken,
    ) -> Result<Generated<Vec<FrameDescription>>, GenerationError> {
        let context = prompt_context(&self.config, self.offset);
        let images: Vec<PathBuf> = chunk.iter().map(|frame| frame.path.clone()).collect();
        run_with_retries(
            self.runner.as_ref(),
            RetryPlan {
                operation: "frame description",
                base_prompt: frame_description_prompt(chunk, &context),
                images: &images,
                max_attempts: self.config.attempts.single_field,
            },
            cancel,
            |raw: &str| parse_frame_descriptions(raw, chunk),
            accept_all,
        )
        .await
    }

    fn batch_duration(&self, batch: &FrameBatch) -> f64 {
        batch.duration_secs.unwrap_or_else(|| {
            let last = batch
                .frames
                .iter()
                .map(|frame| frame.offset_secs)
                .fold(0.0, f64::max);
            last + self.config.frames.fallback_interval_secs as f64
        })
    }

    /// One observation per frame at a fixed spacing, reusing any descriptions
    /// that were already produced.
    fn fallback(
        &self,
        batch: &FrameBatch,
        descriptions: &[FrameDescription],
        usage: TokenUsage,
        calls: u32,
    ) -> Generated<FrameObservations> {
        let interval = self.config.frames.fallback_interval_secs.max(1);
        let created_at = Utc::now().timestamp();
        let observations = batch
            .frames
            .iter()
            .enumerate()
            .map(|(idx, frame)| {
                let text = descriptions
                    .iter()
                    .find(|d| d.offset_secs == frame.offset_secs)
                    .map_or(FALLBACK_TEXT, |d| d.description.as_str());
                let start = batch.start_ts + idx as i64 * interval;
                Observation {
                    created_at: Some(created_at),
                    ..Observation::new(batch.batch_id, start, start + interval, text)
                }
            })
            .collect();

        Generated {
            value: FrameObservations {
                observations,
                fell_back: true,
            },
            usage,
            attempts: calls,
        }
    }
}
