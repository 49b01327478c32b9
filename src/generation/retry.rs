use std::path::PathBuf;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::{InvokeOptions, InvokeRequest, LlmRunner};
use crate::error::{AttemptFailure, BackendError, GenerationError, ParseFailure, ValidationFailure};
use crate::models::TokenUsage;
use crate::prompts::with_correction;
use crate::utils::truncate_for_log;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AttemptPhase {
    Building,
    Invoking,
    Parsing,
    Validating,
    Retrying,
    Committed,
    Exhausted,
}

/// State carried from one attempt to the next.
#[derive(Debug, Clone)]
pub struct AttemptState {
    pub phase: AttemptPhase,
    pub attempt: u32,
    pub max_attempts: u32,
    base_prompt: String,
    pub prompt: String,
    pub usage: TokenUsage,
    pub failures: Vec<AttemptFailure>,
    pub last_raw: Option<String>,
}

impl AttemptState {
    pub fn new(base_prompt: String, max_attempts: u32) -> Self {
        Self {
            phase: AttemptPhase::Building,
            attempt: 0,
            max_attempts: max_attempts.max(1),
            prompt: base_prompt.clone(),
            base_prompt,
            usage: TokenUsage::zero(),
            failures: Vec::new(),
            last_raw: None,
        }
    }

    pub fn base_prompt(&self) -> &str {
        &self.base_prompt
    }

    /// Move to the next attempt, or `None` once the budget is spent.
    pub fn begin_attempt(&mut self) -> Option<u32> {
        if self.attempt >= self.max_attempts {
            self.phase = AttemptPhase::Exhausted;
            return None;
        }
        self.attempt += 1;
        self.phase = AttemptPhase::Building;
        Some(self.attempt)
    }

    /// Record a failed attempt and prepare the prompt for the next one.
    ///
    /// Content defects append a correction to the base prompt. Backend
    /// failures say nothing about the content, so the base prompt is reused.
    pub fn fail(&mut self, failure: AttemptFailure) {
        self.prompt = if failure.is_content_defect() {
            with_correction(&self.base_prompt, self.attempt, &failure.corrective_text())
        } else {
            self.base_prompt.clone()
        };
        self.failures.push(failure);
        self.phase = if self.attempt >= self.max_attempts {
            AttemptPhase::Exhausted
        } else {
            AttemptPhase::Retrying
        };
    }

    pub fn into_error(mut self, operation: &'static str) -> GenerationError {
        let last = self.failures.pop().unwrap_or_else(|| {
            AttemptFailure::Backend(BackendError::Transport("no attempt was made".to_string()))
        });
        GenerationError::ExhaustedRetries {
            operation,
            attempts: self.attempt,
            last: Box::new(last),
            last_raw: self.last_raw,
            usage: self.usage,
        }
    }
}

/// A committed result plus what it cost.
#[derive(Debug, Clone)]
pub struct Generated<T> {
    pub value: T,
    pub usage: TokenUsage,
    pub attempts: u32,
}

/// One retried generation: which prompt, which images, and how many tries.
pub struct RetryPlan<'a> {
    pub operation: &'static str,
    pub base_prompt: String,
    pub images: &'a [PathBuf],
    pub max_attempts: u32,
}

/// Build → invoke → parse → validate, retrying up to `plan.max_attempts`.
///
/// Backend errors that are not retryable (a missing tool, cancellation,
/// unusable images) end the loop at once. Everything else is retried; on exhaustion the last failure and last raw output are returned.
pub async fn run_with_retries<R, T, P, V>(
    runner: &R,
    plan: RetryPlan<'_>,
    cancel: &CancellationToken,
    mut parse: P,
    mut validate: V,
) -> Result<Generated<T>, GenerationError>
where
    R: LlmRunner + ?Sized,
    P: FnMut(&str) -> Result<T, ParseFailure>,
    V: FnMut(&T) -> Result<(), ValidationFailure>,
{
    let request_id = Uuid::new_v4();
    let mut state = AttemptState::new(plan.base_prompt, plan.max_attempts);

    while let Some(attempt) = state.begin_attempt() {
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        state.phase = AttemptPhase::Invoking;
        let request = InvokeRequest {
            prompt: state.prompt.clone(),
            images: plan.images.to_vec(),
            model: None,
            options: InvokeOptions {
                attempt,
                ..InvokeOptions::default()
            },
        };

        let run = match runner.invoke(&request, cancel).await {
            Ok(run) => run,
            Err(err) if !err.is_retryable() => return Err(err.into()),
            Err(err) => {
                log_warn!(
                    "[{request_id}] {} attempt {}/{} backend failure: {err}",
                    plan.operation,
                    attempt,
                    state.max_attempts
                );
                if let Some(raw) = err.raw_output() {
                    state.last_raw = Some(raw.to_string());
                }
                state.fail(err.into());
                continue;
            }
        };

        state.usage = state.usage.adding_opt(run.usage);
        state.phase = AttemptPhase::Parsing;
        let parsed = parse(&run.stdout);
        state.last_raw = Some(run.stdout);

        let value = match parsed {
            Ok(value) => value,
            Err(failure) => {
                log_warn!(
                    "[{request_id}] {} attempt {}/{} unparseable ({}): {}",
                    plan.operation,
                    attempt,
                    state.max_attempts,
                    failure.reason,
                    truncate_for_log(&failure.raw)
                );
                state.fail(failure.into());
                continue;
            }
        };

        state.phase = AttemptPhase::Validating;
        if let Err(failure) = validate(&value) {
            log_warn!(
                "[{request_id}] {} attempt {}/{} rejected: {}",
                plan.operation,
                attempt,
                state.max_attempts,
                truncate_for_log(failure.diagnostic())
            );
            state.fail(failure.into());
            continue;
        }

        state.phase = AttemptPhase::Committed;
        log_info!(
            "[{request_id}] {} committed on attempt {}/{} ({} tokens)",
            plan.operation,
            attempt,
            state.max_attempts,
            state.usage.total()
        );
        return Ok(Generated {
            value,
            usage: state.usage,
            attempts: attempt,
        });
    }

    log_warn!(
        "[{request_id}] {} exhausted {} attempt(s)",
        plan.operation,
        state.attempt
    );
    Err(state.into_error(plan.operation))
}

/// Validator for results that need none.
pub fn accept_all<T>(_: &T) -> Result<(), ValidationFailure> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse_text_field;
    use crate::test_support::ScriptedRunner;
    use std::time::Duration;

    fn plan(base: &str, max_attempts: u32) -> RetryPlan<'static> {
        RetryPlan {
            operation: "title",
            base_prompt: base.to_string(),
            images: &[],
            max_attempts,
        }
    }

    fn parse_title(raw: &str) -> Result<String, ParseFailure> {
        parse_text_field(raw, "title")
    }

    fn short_title(title: &String) -> Result<(), ValidationFailure> {
        if title.len() > 20 {
            return Err(ValidationFailure::Field(format!(
                "The title \"{title}\" is {} characters; use at most 20.",
                title.len()
            )));
        }
        Ok(())
    }

    #[tokio::test]
    async fn validation_failure_feeds_diagnostic_into_next_prompt() {
        let runner = ScriptedRunner::replying([
            "A very long title that goes on and on",
            "Fixing CI",
        ]);
        let result = run_with_retries(
            &runner,
            plan("Write a title.", 3),
            &CancellationToken::new(),
            parse_title,
            short_title,
        )
        .await
        .unwrap();

        assert_eq!(result.value, "Fixing CI");
        assert_eq!(result.attempts, 2);

        let prompts = runner.prompts();
        assert_eq!(prompts[0], "Write a title.");
        assert!(prompts[1].starts_with("Write a title."));
        assert!(prompts[1].contains(
            "The title \"A very long title that goes on and on\" is 37 characters; use at most 20."
        ));
    }

    #[tokio::test]
    async fn backend_failure_resets_to_base_prompt() {
        let runner = ScriptedRunner::new([
            Ok("   ".to_string()),
            Err(BackendError::Timeout {
                after: Duration::from_secs(300),
            }),
            Ok("Fixing CI".to_string()),
        ]);
        let result = run_with_retries(
            &runner,
            plan("Write a title.", 3),
            &CancellationToken::new(),
            parse_title,
            accept_all,
        )
        .await
        .unwrap();

        assert_eq!(result.attempts, 3);
        let prompts = runner.prompts();
        assert!(prompts[1].contains("PREVIOUS ATTEMPT FAILED"));
        assert_eq!(prompts[2], "Write a title.");
    }

    #[tokio::test]
    async fn not_installed_is_not_retried() {
        let runner = ScriptedRunner::new([
            Err(BackendError::NotInstalled {
                tool: "claude".into(),
                hint: "npm install".into(),
            }),
            Ok("Fixing CI".to_string()),
        ]);
        let err = run_with_retries(
            &runner,
            plan("Write a title.", 3),
            &CancellationToken::new(),
            parse_title,
            accept_all,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GenerationError::BackendNotInstalled { .. }));
        assert_eq!(runner.prompts().len(), 1);
    }

    #[tokio::test]
    async fn unusable_images_are_not_retried() {
        let runner = ScriptedRunner::new([
            Err(BackendError::InvalidImages("failed to decode image /tmp/a.png".into())),
            Ok("Fixing CI".to_string()),
        ]);
        let err = run_with_retries(
            &runner,
            plan("Write a title.", 3),
            &CancellationToken::new(),
            parse_title,
            accept_all,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            GenerationError::Backend(BackendError::InvalidImages(_))
        ));
        assert_eq!(runner.prompts().len(), 1);
    }

    #[tokio::test]
    async fn exhaustion_keeps_last_raw_output_and_usage() {
        let usage = TokenUsage {
            input: 100,
            cached_input: 0,
            output: 10,
        };
        let runner = ScriptedRunner::replying(["", "still nothing useful?", " "]).with_usage(usage);
        let err = run_with_retries(
            &runner,
            plan("Write a title.", 3),
            &CancellationToken::new(),
            parse_title,
            |_: &String| Err(ValidationFailure::Field("never good enough".into())),
        )
        .await
        .unwrap_err();

        match &err {
            GenerationError::ExhaustedRetries { attempts, last, .. } => {
                assert_eq!(*attempts, 3);
                assert!(last.is_content_defect());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.last_raw(), Some(" "));
        assert_eq!(err.usage().input, 300);
        assert_eq!(runner.prompts().len(), 3);
    }

    #[tokio::test]
    async fn cancelled_before_start_makes_no_call() {
        let runner = ScriptedRunner::replying(["Fixing CI"]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_with_retries(&runner, plan("Write a title.", 3), &cancel, parse_title, accept_all)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Cancelled));
        assert!(runner.prompts().is_empty());
    }

    #[test]
    fn state_phases_follow_the_loop() {
        let mut state = AttemptState::new("base".into(), 2);
        assert_eq!(state.begin_attempt(), Some(1));
        state.fail(ValidationFailure::Coverage("gap".into()).into());
        assert_eq!(state.phase, AttemptPhase::Retrying);
        assert!(state.prompt.contains("gap"));
        assert_eq!(state.base_prompt(), "base");
        assert_eq!(state.begin_attempt(), Some(2));
        state.fail(BackendError::Transport("refused".into()).into());
        assert_eq!(state.phase, AttemptPhase::Exhausted);
        assert_eq!(state.prompt, "base");
        assert_eq!(state.begin_attempt(), None);
    }
}
