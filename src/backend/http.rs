use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::models::TokenUsage;
use crate::telemetry::{CallRecord, CallRecorder, CallStatus};
use crate::utils::truncate_for_log;

use super::images::prepare_images;
use super::kind::BackendKind;
use super::{InvokeRequest, RunResult};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Talks to an OpenAI-compatible `/chat/completions` endpoint (Ollama, LM Studio, custom).
pub struct HttpRunner {
    kind: BackendKind,
    client: Client,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    timeout: Duration,
    max_attempts: u32,
    backoff_base: Duration,
    temperature: f32,
    max_tokens: u32,
    max_image_height: u32,
    recorder: CallRecorder,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokenDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokenDetails {
    #[serde(default)]
    cached_tokens: u64,
}

/// Outcome of a single POST, before the retry decision.
enum AttemptOutcome {
    Decoded { content: String, usage: Option<TokenUsage> },
    Failed { error: BackendError, http_status: Option<u16> },
}

impl HttpRunner {
    pub fn new(config: &BackendConfig, recorder: CallRecorder) -> Result<Self> {
        let base_url = config
            .endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .or_else(|| config.kind.default_endpoint().map(str::to_string))
            .ok_or_else(|| anyhow!("backend {} needs an endpoint URL", config.kind.label()))?;

        let client = Client::builder()
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            kind: config.kind,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            default_model: config.model_id(),
            timeout: config.generation_timeout(),
            max_attempts: config.http_max_attempts.max(1),
            backoff_base: Duration::from_millis(config.http_backoff_base_ms),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_image_height: config.max_image_height,
            recorder,
        })
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn label(&self) -> String {
        format!("{} ({})", self.kind.label(), self.base_url)
    }

    pub fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Delay before retry number `attempt` (1-based): base, 2·base, 4·base, ...
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    pub(crate) fn build_body(
        &self,
        prompt: &str,
        image_urls: &[String],
        model: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Value {
        let mut content = vec![json!({ "type": "text", "text": prompt })];
        content.extend(
            image_urls
                .iter()
                .map(|url| json!({ "type": "image_url", "image_url": { "url": url } })),
        );

        json!({
            "model": model,
            "messages": [{ "role": "user", "content": content }],
            "temperature": temperature,
            "max_tokens": max_tokens,
            "stream": false,
        })
    }

    pub async fn invoke(
        &self,
        request: &InvokeRequest,
        cancel: &CancellationToken,
    ) -> Result<RunResult, BackendError> {
        let started_at = Utc::now();
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let timeout = request.options.timeout.unwrap_or(self.timeout);

        let image_urls = self.encode_images(request).await?;
        let body = self.build_body(
            &request.prompt,
            &image_urls,
            &model,
            request.options.temperature.unwrap_or(self.temperature),
            request.options.max_tokens.unwrap_or(self.max_tokens),
        );
        drop(image_urls);

        let mut last_error = BackendError::Transport("no attempt was made".to_string());
        for attempt in 1..=self.max_attempts {
            let clock = Instant::now();
            let attempt_started = Utc::now();

            let outcome = tokio::select! {
                outcome = self.post_once(&body, timeout) => outcome,
                _ = cancel.cancelled() => return Err(BackendError::Cancelled),
            };

            match outcome {
                AttemptOutcome::Decoded { content, usage } => {
                    self.record(&model, request, attempt, attempt_started, clock, &body, None, Ok(&content))
                        .await;
                    return Ok(RunResult {
                        exit_status: 0,
                        stdout: strip_think_blocks(&content),
                        stderr: String::new(),
                        started_at,
                        finished_at: Utc::now(),
                        usage,
                    });
                }
                AttemptOutcome::Failed { error, http_status } => {
                    self.record(&model, request, attempt, attempt_started, clock, &body, http_status, Err(&error))
                        .await;
                    last_error = error;
                }
            }

            if attempt < self.max_attempts {
                let delay = self.backoff_for(attempt);
                log_warn!(
                    "[http] {} attempt {}/{} failed ({last_error}); retrying in {}ms",
                    self.label(),
                    attempt,
                    self.max_attempts,
                    delay.as_millis()
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(BackendError::Cancelled),
                }
            }
        }

        Err(last_error)
    }

    async fn encode_images(&self, request: &InvokeRequest) -> Result<Vec<String>, BackendError> {
        let scaled = prepare_images(&request.images, self.max_image_height)
            .await
            .map_err(|err| BackendError::InvalidImages(format!("{err:#}")))?;

        let mut urls = Vec::with_capacity(scaled.paths().len());
        for path in scaled.paths() {
            let bytes = tokio::fs::read(path).await.map_err(|err| {
                BackendError::InvalidImages(format!("failed to read {}: {err}", path.display()))
            })?;
            urls.push(format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes)));
        }
        Ok(urls)
    }

    async fn post_once(&self, body: &Value, timeout: Duration) -> AttemptOutcome {
        let mut builder = self.client.post(self.chat_url()).timeout(timeout).json(body);
        if self.kind.requires_auth() {
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                let error = if err.is_timeout() {
                    BackendError::Timeout { after: timeout }
                } else {
                    BackendError::Transport(err.to_string())
                };
                return AttemptOutcome::Failed { error, http_status: None };
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                return AttemptOutcome::Failed {
                    error: BackendError::Transport(format!("failed to read response body: {err}")),
                    http_status: Some(status.as_u16()),
                }
            }
        };

        if status != StatusCode::OK {
            return AttemptOutcome::Failed {
                error: BackendError::Transport(format!(
                    "HTTP {status}: {}",
                    truncate_for_log(&text)
                )),
                http_status: Some(status.as_u16()),
            };
        }

        match decode_chat_response(&text) {
            Ok((content, usage)) => AttemptOutcome::Decoded { content, usage },
            Err(err) => AttemptOutcome::Failed {
                error: BackendError::Transport(err.to_string()),
                http_status: Some(status.as_u16()),
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        model: &str,
        request: &InvokeRequest,
        attempt: u32,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
        body: &Value,
        http_status: Option<u16>,
        result: Result<&String, &BackendError>,
    ) {
        let duration_ms = clock.elapsed().as_millis() as u64;
        let (status, excerpt, error) = match result {
            Ok(content) => {
                log_info!(
                    "[http] {} call {} succeeded in {}ms",
                    self.label(),
                    request.options.attempt,
                    duration_ms
                );
                (CallStatus::Success, Some(truncate_for_log(content)), None)
            }
            Err(err) => (CallStatus::Failure, None, Some(err.to_string())),
        };

        self.recorder
            .record(CallRecord {
                started_at,
                duration_ms,
                backend: self.kind.label().to_string(),
                model: model.to_string(),
                attempt,
                status,
                http_status: http_status.or(if status == CallStatus::Success { Some(200) } else { None }),
                exit_code: None,
                // The recorder swaps image payloads for a placeholder.
                request_body: Some(body.clone()),
                response_excerpt: excerpt,
                error,
            })
            .await;
    }
}

/// Pull the first choice's text and the usage block out of a completion body.
pub(crate) fn decode_chat_response(text: &str) -> Result<(String, Option<TokenUsage>)> {
    let response: ChatResponse =
        serde_json::from_str(text).context("response is not a chat completion")?;
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| anyhow!("chat completion has no message content"))?;
    let usage = response.usage.map(|usage| TokenUsage {
        input: usage.prompt_tokens,
        cached_input: usage
            .prompt_tokens_details
            .map(|details| details.cached_tokens)
            .unwrap_or(0),
        output: usage.completion_tokens,
    });
    Ok((content, usage))
}

/// Reasoning models served locally prepend `<think>...</think>`; drop it.
pub(crate) fn strip_think_blocks(content: &str) -> String {
    let mut rest = content;
    let mut out = String::with_capacity(content.len());
    while let Some(open) = rest.find("<think>") {
        out.push_str(&rest[..open]);
        match rest[open..].find("</think>") {
            Some(close) => rest = &rest[open + close + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: BackendKind) -> BackendConfig {
        BackendConfig {
            kind,
            http_backoff_base_ms: 0,
            ..BackendConfig::default()
        }
    }

    #[test]
    fn custom_backend_requires_endpoint() {
        assert!(HttpRunner::new(&config(BackendKind::Custom), CallRecorder::new()).is_err());
        let runner = HttpRunner::new(
            &BackendConfig {
                endpoint: Some("https://llm.example.com/v1/".into()),
                ..config(BackendKind::Custom)
            },
            CallRecorder::new(),
        )
        .unwrap();
        assert_eq!(runner.chat_url(), "https://llm.example.com/v1/chat/completions");
    }

    #[test]
    fn backoff_doubles() {
        let runner = HttpRunner::new(
            &BackendConfig {
                http_backoff_base_ms: 2_000,
                ..config(BackendKind::LmStudio)
            },
            CallRecorder::new(),
        )
        .unwrap();
        assert_eq!(runner.backoff_for(1), Duration::from_secs(2));
        assert_eq!(runner.backoff_for(2), Duration::from_secs(4));
        assert_eq!(runner.backoff_for(3), Duration::from_secs(8));
    }

    #[test]
    fn body_mixes_text_and_images() {
        let runner = HttpRunner::new(&config(BackendKind::Ollama), CallRecorder::new()).unwrap();
        let body = runner.build_body(
            "describe",
            &["data:image/jpeg;base64,AAAA".to_string()],
            "qwen2.5vl:3b",
            0.2,
            512,
        );
        assert_eq!(body["model"], "qwen2.5vl:3b");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 512);
        let content = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[0]["text"], "describe");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,AAAA");
    }

    #[test]
    fn decodes_content_and_usage() {
        let (content, usage) = decode_chat_response(
            r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}],
                "usage":{"prompt_tokens":10,"completion_tokens":3,"prompt_tokens_details":{"cached_tokens":4}}}"#,
        )
        .unwrap();
        assert_eq!(content, "hi");
        assert_eq!(
            usage,
            Some(TokenUsage {
                input: 10,
                cached_input: 4,
                output: 3
            })
        );
        assert!(decode_chat_response(r#"{"choices":[]}"#).is_err());
        assert!(decode_chat_response("<html>").is_err());
    }

    #[test]
    fn strips_reasoning_preamble() {
        assert_eq!(strip_think_blocks("<think>hmm</think>\n{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_think_blocks("plain"), "plain");
        assert_eq!(strip_think_blocks("x <think>never closed"), "x");
    }

    #[tokio::test]
    async fn unreachable_endpoint_retries_then_fails() {
        let recorder = CallRecorder::new();
        let runner = HttpRunner::new(
            &BackendConfig {
                endpoint: Some("http://127.0.0.1:9/v1".into()),
                ..config(BackendKind::LmStudio)
            },
            recorder.clone(),
        )
        .unwrap();

        let err = runner
            .invoke(&InvokeRequest::text("ping"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::Transport(_) | BackendError::Timeout { .. }
        ));

        let stats = recorder.snapshot().await;
        assert_eq!(stats.call_count, 3);
        assert_eq!(stats.failure_count, 3);
        let logged = stats.recent_calls[0].request_body.as_ref().unwrap();
        assert_eq!(logged["messages"][0]["content"][0]["text"], "ping");
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let runner = HttpRunner::new(
            &BackendConfig {
                endpoint: Some("http://127.0.0.1:9/v1".into()),
                http_backoff_base_ms: 60_000,
                ..config(BackendKind::LmStudio)
            },
            CallRecorder::new(),
        )
        .unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });
        let started = Instant::now();
        let err = runner
            .invoke(&InvokeRequest::text("ping"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
