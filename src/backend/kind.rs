use serde::{Deserialize, Serialize};

/// The closed set of supported backends.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BackendKind {
    #[default]
    ClaudeCli,
    CodexCli,
    Ollama,
    LmStudio,
    Custom,
}

impl BackendKind {
    pub fn label(self) -> &'static str {
        match self {
            BackendKind::ClaudeCli => "claude-cli",
            BackendKind::CodexCli => "codex-cli",
            BackendKind::Ollama => "ollama",
            BackendKind::LmStudio => "lm-studio",
            BackendKind::Custom => "custom-http",
        }
    }

    pub fn is_cli(self) -> bool {
        matches!(self, BackendKind::ClaudeCli | BackendKind::CodexCli)
    }

    /// Executable name for subprocess backends.
    pub fn command_name(self) -> Option<&'static str> {
        match self {
            BackendKind::ClaudeCli => Some("claude"),
            BackendKind::CodexCli => Some("codex"),
            _ => None,
        }
    }

    /// Base URL (up to and including `/v1`) for HTTP engines.
    pub fn default_endpoint(self) -> Option<&'static str> {
        match self {
            BackendKind::Ollama => Some("http://localhost:11434/v1"),
            BackendKind::LmStudio => Some("http://localhost:1234/v1"),
            _ => None,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            BackendKind::ClaudeCli => "sonnet",
            BackendKind::CodexCli => "gpt-5",
            BackendKind::Ollama => "qwen2.5vl:3b",
            BackendKind::LmStudio => "qwen/qwen3-vl-4b",
            BackendKind::Custom => "gpt-4o-mini",
        }
    }

    /// Only the user-supplied endpoint sends a bearer token.
    pub fn requires_auth(self) -> bool {
        matches!(self, BackendKind::Custom)
    }

    /// What to tell the user when the backend cannot be reached at all.
    pub fn install_hint(self) -> &'static str {
        match self {
            BackendKind::ClaudeCli => {
                "Install Claude Code (`npm install -g @anthropic-ai/claude-code`) and run `claude login` in a terminal."
            }
            BackendKind::CodexCli => {
                "Install the Codex CLI (`npm install -g @openai/codex`) and run `codex auth` in a terminal."
            }
            BackendKind::Ollama => "Start Ollama and pull the model with `ollama pull <model>`.",
            BackendKind::LmStudio => "Start LM Studio's local server and load the model.",
            BackendKind::Custom => "Check the endpoint URL and API key in the configuration.",
        }
    }
}
