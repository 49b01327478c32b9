use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use crate::backend::BackendKind;
use crate::models::{default_categories, CategoryConfig};
use crate::validation::ValidationConfig;

const FALLBACK_SHELL: &str = "/bin/zsh";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Overrides the backend's default model identifier.
    pub model: Option<String>,
    /// Overrides the HTTP engine's base URL; required for `custom`.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// Login shell used to launch CLI tools. `None` means `$SHELL`.
    pub shell: Option<PathBuf>,
    pub generation_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub http_max_attempts: u32,
    pub http_backoff_base_ms: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_image_height: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            model: None,
            endpoint: None,
            api_key: None,
            shell: None,
            generation_timeout_secs: 300,
            probe_timeout_secs: 30,
            http_max_attempts: 3,
            http_backoff_base_ms: 2_000,
            temperature: 0.3,
            max_tokens: 4_096,
            max_image_height: 720,
        }
    }
}

impl BackendConfig {
    pub fn model_id(&self) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.kind.default_model().to_string())
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// The shell to launch CLI tools through. Resolved once, at backend construction.
    pub fn resolve_shell(&self) -> PathBuf {
        self.shell
            .clone()
            .or_else(|| std::env::var_os("SHELL").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(FALLBACK_SHELL))
    }
}

/// How many times each kind of generation may be attempted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AttemptLimits {
    pub cards: u32,
    pub single_field: u32,
    pub segments: u32,
    pub merge_decision: u32,
}

impl Default for AttemptLimits {
    fn default() -> Self {
        Self {
            cards: 4,
            single_field: 3,
            segments: 2,
            merge_decision: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeConfig {
    pub enabled: bool,
    pub confidence_threshold: f64,
    /// Previous cards at least this long are left alone.
    pub skip_if_previous_minutes: f64,
    pub max_gap_minutes: f64,
    pub max_merged_minutes: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: 0.8,
            skip_if_previous_minutes: 40.0,
            max_gap_minutes: 5.0,
            max_merged_minutes: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FrameConfig {
    pub frames_per_call: usize,
    /// Spacing of the synthesized observations when segment merging gives up.
    pub fallback_interval_secs: i64,
    /// How far a segment may run past the batch end before it is rejected.
    pub segment_slack_secs: f64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frames_per_call: 4,
            fallback_interval_secs: 10,
            segment_slack_secs: 5.0,
        }
    }
}

/// Everything a generation request needs, passed explicitly to constructors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    pub backend: BackendConfig,
    pub attempts: AttemptLimits,
    pub validation: ValidationConfig,
    pub merge: MergeConfig,
    pub frames: FrameConfig,
    pub categories: Vec<CategoryConfig>,
    pub output_language: Option<String>,
    /// Offset used to render epoch times as wall-clock strings. `None` means local.
    pub utc_offset_minutes: Option<i32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            attempts: AttemptLimits::default(),
            validation: ValidationConfig::default(),
            merge: MergeConfig::default(),
            frames: FrameConfig::default(),
            categories: default_categories(),
            output_language: None,
            utc_offset_minutes: None,
        }
    }
}

/// File-backed configuration. Requests take an immutable snapshot up front.
pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<Arc<GenerationConfig>>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Invalid config at {} ({err}); falling back to defaults",
                    path.display()
                );
                GenerationConfig::default()
            })
        } else {
            GenerationConfig::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(Arc::new(data)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Arc<GenerationConfig> {
        Arc::clone(&self.data.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Apply `change` to a copy, persist it, then publish it to new snapshots.
    pub fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut GenerationConfig),
    {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = GenerationConfig::clone(&guard);
        change(&mut next);
        self.persist(&next)?;
        *guard = Arc::new(next);
        Ok(())
    }

    fn persist(&self, data: &GenerationConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write config to {}", self.path.display()))
    }
}
