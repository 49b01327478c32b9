mod types;

pub use types::{CallRecord, CallStats, CallStatus};

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

const MAX_RECENT_CALLS: usize = 50;
const IMAGE_PLACEHOLDER: &str = "<image omitted>";

/// Shared log of backend attempts. Cloning hands out another handle to the same log.
#[derive(Clone, Default)]
pub struct CallRecorder {
    inner: Arc<Mutex<RecorderState>>,
}

#[derive(Default)]
struct RecorderState {
    recent_calls: Vec<CallRecord>,
    call_count: u64,
    failure_count: u64,
    total_duration_ms: u64,
}

impl CallRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, mut record: CallRecord) {
        if let Some(body) = record.request_body.take() {
            record.request_body = Some(redact_image_payloads(body));
        }

        log::debug!(
            "[telemetry] {} attempt {} ({}) {:?} in {}ms{}",
            record.backend,
            record.attempt,
            record.model,
            record.status,
            record.duration_ms,
            record
                .error
                .as_deref()
                .map(|e| format!(": {e}"))
                .unwrap_or_default()
        );

        let mut state = self.inner.lock().await;
        state.call_count += 1;
        if record.status == CallStatus::Failure {
            state.failure_count += 1;
        }
        state.total_duration_ms = state.total_duration_ms.saturating_add(record.duration_ms);
        state.recent_calls.push(record);
        if state.recent_calls.len() > MAX_RECENT_CALLS {
            state.recent_calls.remove(0);
        }
    }

    pub async fn snapshot(&self) -> CallStats {
        let state = self.inner.lock().await;
        CallStats {
            recent_calls: state.recent_calls.clone(),
            call_count: state.call_count,
            failure_count: state.failure_count,
            total_duration_ms: state.total_duration_ms,
        }
    }

    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        *state = RecorderState::default();
    }
}

/// Replace every `image_url` payload (and bare data URLs) with a placeholder.
pub fn redact_image_payloads(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, val)| {
                    if key == "image_url" {
                        (key, Value::String(IMAGE_PLACEHOLDER.to_string()))
                    } else {
                        (key, redact_image_payloads(val))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(redact_image_payloads).collect()),
        Value::String(s) if s.starts_with("data:image/") => {
            Value::String(IMAGE_PLACEHOLDER.to_string())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn record(attempt: u32, status: CallStatus) -> CallRecord {
        CallRecord {
            started_at: Utc::now(),
            duration_ms: 5,
            backend: "ollama".into(),
            model: "m".into(),
            attempt,
            status,
            http_status: None,
            exit_code: None,
            request_body: None,
            response_excerpt: None,
            error: None,
        }
    }

    #[test]
    fn strips_image_bytes_but_keeps_text() {
        let body = json!({
            "model": "m",
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "describe"},
                    {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,AAAA"}}
                ]
            }]
        });
        let redacted = redact_image_payloads(body);
        let rendered = redacted.to_string();
        assert!(!rendered.contains("AAAA"));
        assert!(rendered.contains("describe"));
        assert!(rendered.contains(IMAGE_PLACEHOLDER));
    }

    #[tokio::test]
    async fn keeps_bounded_history_and_counts() {
        let recorder = CallRecorder::new();
        for attempt in 0..(MAX_RECENT_CALLS as u32 + 5) {
            let status = if attempt % 2 == 0 {
                CallStatus::Success
            } else {
                CallStatus::Failure
            };
            recorder.record(record(attempt, status)).await;
        }
        let stats = recorder.snapshot().await;
        assert_eq!(stats.recent_calls.len(), MAX_RECENT_CALLS);
        assert_eq!(stats.call_count, MAX_RECENT_CALLS as u64 + 5);
        assert_eq!(stats.failure_count, 27);
        assert_eq!(stats.recent_calls[0].attempt, 5);

        recorder.reset().await;
        assert_eq!(recorder.snapshot().await.call_count, 0);
    }
}
