use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A sampled screenshot, positioned relative to the start of its batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub path: PathBuf,
    pub offset_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrameDescription {
    pub offset_secs: f64,
    pub description: String,
}

/// A stretch of a batch described as one activity. Offsets are batch-relative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoSegment {
    pub start_secs: f64,
    pub end_secs: f64,
    pub description: String,
}
