use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CallStatus {
    Success,
    Failure,
}

/// One backend attempt as seen from the outside.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub backend: String,
    pub model: String,
    pub attempt: u32,
    pub status: CallStatus,
    pub http_status: Option<u16>,
    pub exit_code: Option<i32>,
    /// Request body with image payloads replaced by a placeholder.
    pub request_body: Option<serde_json::Value>,
    pub response_excerpt: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStats {
    pub recent_calls: Vec<CallRecord>,
    pub call_count: u64,
    pub failure_count: u64,
    pub total_duration_ms: u64,
}
