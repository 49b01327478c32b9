use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::backend::{InvokeRequest, LlmRunner, RunResult};
use crate::error::BackendError;
use crate::models::TokenUsage;

/// Replays queued replies in order and remembers every request it was sent.
pub(crate) struct ScriptedRunner {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    usage: Option<TokenUsage>,
    requests: Mutex<Vec<(String, Vec<PathBuf>)>>,
}

impl ScriptedRunner {
    pub(crate) fn new(replies: impl IntoIterator<Item = Result<String, BackendError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            usage: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replying<'a>(replies: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(replies.into_iter().map(|reply| Ok(reply.to_string())))
    }

    /// Report `usage` on every successful reply.
    pub(crate) fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(prompt, _)| prompt.clone())
            .collect()
    }

    pub(crate) fn images(&self) -> Vec<Vec<PathBuf>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, images)| images.clone())
            .collect()
    }
}

#[async_trait]
impl LlmRunner for ScriptedRunner {
    fn label(&self) -> String {
        "scripted".to_string()
    }

    async fn invoke(
        &self,
        request: &InvokeRequest,
        cancel: &CancellationToken,
    ) -> Result<RunResult, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        self.requests
            .lock()
            .unwrap()
            .push((request.prompt.clone(), request.images.clone()));

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Transport("script exhausted".to_string())))?;

        let now = Utc::now();
        Ok(RunResult {
            exit_status: 0,
            stdout: reply,
            stderr: String::new(),
            started_at: now,
            finished_at: now,
            usage: self.usage,
        })
    }
}
