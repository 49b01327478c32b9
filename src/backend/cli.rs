use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::models::TokenUsage;
use crate::telemetry::{CallRecord, CallRecorder, CallStatus};
use crate::utils::truncate_for_log;

use super::images::prepare_images;
use super::kind::BackendKind;
use super::shell::{join_command, run_in_login_shell, ShellOutput};
use super::{InvokeRequest, RunResult};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const NOT_FOUND_MARKER: &str = "command not found";
/// Also printed by tools that are installed but miss a file, so it only
/// counts when it names the tool itself.
const MISSING_FILE_MARKER: &str = "no such file or directory";

/// Runs a headless CLI tool (`claude`, `codex`) through the user's login shell.
pub struct CliRunner {
    kind: BackendKind,
    program: String,
    shell: PathBuf,
    default_model: String,
    timeout: Duration,
    max_image_height: u32,
    recorder: CallRecorder,
}

impl CliRunner {
    pub fn new(config: &BackendConfig, recorder: CallRecorder) -> Self {
        let program = config
            .kind
            .command_name()
            .unwrap_or_else(|| config.kind.label())
            .to_string();
        Self {
            kind: config.kind,
            program,
            shell: config.resolve_shell(),
            default_model: config.model_id(),
            timeout: config.generation_timeout(),
            max_image_height: config.max_image_height,
            recorder,
        }
    }

    /// Point at a specific executable instead of the tool's bare name.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn label(&self) -> String {
        format!("{} ({})", self.kind.label(), self.program)
    }

    /// Arguments for one headless run. The prompt always comes last, after `--`.
    pub(crate) fn build_args(&self, prompt: &str, images: &[PathBuf], model: &str) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        let mut prompt = prompt.to_string();

        match self.kind {
            BackendKind::CodexCli => {
                args.extend(["exec", "--skip-git-repo-check", "--model", model].map(String::from));
                for image in images {
                    args.push("--image".to_string());
                    args.push(image.display().to_string());
                }
            }
            _ => {
                args.extend(["-p", "--output-format", "json", "--model", model].map(String::from));
                // Claude reads attachments referenced inline as `@path`.
                if !images.is_empty() {
                    prompt.push_str("\n\nScreenshots, in chronological order:\n");
                    for image in images {
                        prompt.push_str(&format!("@{}\n", image.display()));
                    }
                }
            }
        }

        args.push("--".to_string());
        args.push(prompt);
        args
    }

    pub async fn invoke(
        &self,
        request: &InvokeRequest,
        cancel: &CancellationToken,
    ) -> Result<RunResult, BackendError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let timeout = request.options.timeout.unwrap_or(self.timeout);

        // Held until the process has exited; dropping it removes the copies.
        let scaled = prepare_images(&request.images, self.max_image_height)
            .await
            .map_err(|err| BackendError::InvalidImages(format!("{err:#}")))?;

        let args = self.build_args(&request.prompt, scaled.paths(), &model);
        let command = join_command(&self.program, &args);

        log_info!(
            "[cli] {} attempt {}: {} image(s), prompt {} chars, timeout {}s",
            self.label(),
            request.options.attempt,
            scaled.paths().len(),
            request.prompt.len(),
            timeout.as_secs()
        );

        let outcome = run_in_login_shell(&self.shell, &command, timeout, cancel).await;
        drop(scaled);

        let result = outcome.and_then(|output| self.interpret(output, started_at));
        self.record(request, &model, started_at, clock, &result).await;
        result
    }

    fn interpret(
        &self,
        output: ShellOutput,
        started_at: chrono::DateTime<Utc>,
    ) -> Result<RunResult, BackendError> {
        classify_exit(self.kind, &self.program, &output)?;

        let (stdout, usage) = match self.kind {
            BackendKind::ClaudeCli => match parse_claude_envelope(&output.stdout) {
                Some(envelope) if envelope.is_error => {
                    return Err(BackendError::NonZeroExit {
                        code: output.status,
                        stdout: envelope.result,
                        stderr: output.stderr,
                    });
                }
                Some(envelope) => (envelope.result, envelope.usage),
                None => (output.stdout, None),
            },
            _ => (output.stdout, None),
        };

        Ok(RunResult {
            exit_status: output.status,
            stdout,
            stderr: output.stderr,
            started_at,
            finished_at: Utc::now(),
            usage,
        })
    }

    async fn record(
        &self,
        request: &InvokeRequest,
        model: &str,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
        result: &Result<RunResult, BackendError>,
    ) {
        let (status, exit_code, excerpt, error) = match result {
            Ok(run) => (
                CallStatus::Success,
                Some(run.exit_status),
                Some(truncate_for_log(&run.stdout)),
                None,
            ),
            Err(err) => {
                log_warn!("[cli] {} attempt {} failed: {err}", self.label(), request.options.attempt);
                let code = match err {
                    BackendError::NonZeroExit { code, .. } => Some(*code),
                    _ => None,
                };
                (CallStatus::Failure, code, None, Some(err.to_string()))
            }
        };

        self.recorder
            .record(CallRecord {
                started_at,
                duration_ms: clock.elapsed().as_millis() as u64,
                backend: self.kind.label().to_string(),
                model: model.to_string(),
                attempt: request.options.attempt,
                status,
                http_status: None,
                exit_code,
                request_body: None,
                response_excerpt: excerpt,
                error,
            })
            .await;
    }
}

/// Map a finished process onto success, "not installed", or a generic failure.
pub(crate) fn classify_exit(
    kind: BackendKind,
    program: &str,
    output: &ShellOutput,
) -> Result<(), BackendError> {
    if output.status == 0 {
        return Ok(());
    }

    let stderr = output.stderr.to_lowercase();
    let tool_missing = output.status == 127
        || stderr.contains(NOT_FOUND_MARKER)
        || (stderr.contains(MISSING_FILE_MARKER)
            && stderr.contains(&tool_name(program).to_lowercase()));

    if tool_missing {
        return Err(BackendError::NotInstalled {
            tool: tool_name(program).to_string(),
            hint: kind.install_hint().to_string(),
        });
    }

    Err(BackendError::NonZeroExit {
        code: output.status,
        stdout: output.stdout.clone(),
        stderr: output.stderr.clone(),
    })
}

fn tool_name(program: &str) -> &str {
    Path::new(program)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(program)
}

#[derive(Debug, Deserialize)]
struct ClaudeEnvelope {
    #[serde(default)]
    result: String,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

pub(crate) struct ParsedEnvelope {
    pub result: String,
    pub is_error: bool,
    pub usage: Option<TokenUsage>,
}

/// `claude -p --output-format json` wraps the reply and reports token usage.
pub(crate) fn parse_claude_envelope(stdout: &str) -> Option<ParsedEnvelope> {
    let envelope: ClaudeEnvelope = serde_json::from_str(stdout.trim()).ok()?;
    Some(ParsedEnvelope {
        result: envelope.result,
        is_error: envelope.is_error,
        usage: envelope.usage.map(|u| TokenUsage {
            input: u.input_tokens,
            cached_input: u.cache_read_input_tokens,
            output: u.output_tokens,
        }),
    })
}
