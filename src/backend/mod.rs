pub mod cli;
pub mod http;
pub mod images;
pub mod kind;
pub mod shell;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::models::TokenUsage;
use crate::telemetry::CallRecorder;

pub use cli::CliRunner;
pub use http::HttpRunner;
pub use kind::BackendKind;

const PROBE_PROMPT: &str = "Reply with the single word: ready";

/// Per-call knobs that override the backend's configured defaults.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub timeout: Option<Duration>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Attempt index within the caller's retry loop, for telemetry.
    pub attempt: u32,
}

#[derive(Debug, Clone, Default)]
pub struct InvokeRequest {
    pub prompt: String,
    /// Source image paths, in order. Runners scale copies before sending them.
    pub images: Vec<PathBuf>,
    /// `None` uses the backend's configured model.
    pub model: Option<String>,
    pub options: InvokeOptions,
}

impl InvokeRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub usage: Option<TokenUsage>,
}

/// The one capability every backend offers.
#[async_trait]
pub trait LlmRunner: Send + Sync {
    fn label(&self) -> String;

    async fn invoke(
        &self,
        request: &InvokeRequest,
        cancel: &CancellationToken,
    ) -> Result<RunResult, BackendError>;
}

/// Closed set of runner implementations, chosen once from configuration.
pub enum Backend {
    Cli(CliRunner),
    Http(HttpRunner),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub backend: String,
    pub latency_ms: u64,
    pub reply: String,
}

impl Backend {
    pub fn from_config(config: &BackendConfig, recorder: CallRecorder) -> Result<Self> {
        if config.kind.is_cli() {
            Ok(Backend::Cli(CliRunner::new(config, recorder)))
        } else {
            Ok(Backend::Http(HttpRunner::new(config, recorder)?))
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Cli(runner) => runner.kind(),
            Backend::Http(runner) => runner.kind(),
        }
    }

    /// Send a trivial prompt to confirm the backend is installed and answering.
    pub async fn probe(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ProbeReport, BackendError> {
        let request = InvokeRequest {
            options: InvokeOptions {
                timeout: Some(timeout),
                max_tokens: Some(16),
                ..InvokeOptions::default()
            },
            ..InvokeRequest::text(PROBE_PROMPT)
        };

        let clock = Instant::now();
        let result = self.invoke(&request, cancel).await?;
        Ok(ProbeReport {
            backend: self.label(),
            latency_ms: clock.elapsed().as_millis() as u64,
            reply: result.stdout.trim().to_string(),
        })
    }
}

#[async_trait]
impl LlmRunner for Backend {
    fn label(&self) -> String {
        match self {
            Backend::Cli(runner) => runner.label(),
            Backend::Http(runner) => runner.label(),
        }
    }

    async fn invoke(
        &self,
        request: &InvokeRequest,
        cancel: &CancellationToken,
    ) -> Result<RunResult, BackendError> {
        match self {
            Backend::Cli(runner) => runner.invoke(request, cancel).await,
            Backend::Http(runner) => runner.invoke(request, cancel).await,
        }
    }
}
