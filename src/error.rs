use std::time::Duration;

use thiserror::Error;

use crate::models::TokenUsage;

/// Failures of a single backend invocation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("{tool} is not installed or not on PATH. {hint}")]
    NotInstalled { tool: String, hint: String },

    #[error("backend timed out after {}s", .after.as_secs_f64())]
    Timeout { after: Duration },

    #[error("backend exited with status {code}: {stderr}")]
    NonZeroExit {
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    /// An input image could not be decoded or re-encoded.
    #[error("could not prepare images: {0}")]
    InvalidImages(String),

    #[error("backend call cancelled")]
    Cancelled,
}

impl BackendError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::NotInstalled { .. } | Self::Cancelled | Self::InvalidImages(_)
        )
    }

    /// Raw output the backend produced before failing, if any.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { stdout, .. } if !stdout.is_empty() => Some(stdout),
            _ => None,
        }
    }
}

/// No parse strategy produced a usable record.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("could not parse {kind} from model output: {reason}")]
pub struct ParseFailure {
    pub kind: &'static str,
    pub reason: String,
    pub raw: String,
}

impl ParseFailure {
    pub fn new(kind: &'static str, reason: impl Into<String>, raw: &str) -> Self {
        Self {
            kind,
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }
}

/// Output that parsed but broke a timeline invariant. The message is written
/// to be pasted back into a corrective prompt.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationFailure {
    #[error("{0}")]
    Coverage(String),
    #[error("{0}")]
    Duration(String),
    #[error("{0}")]
    Segments(String),
    #[error("{0}")]
    Field(String),
}

impl ValidationFailure {
    pub fn diagnostic(&self) -> &str {
        match self {
            Self::Coverage(msg) | Self::Duration(msg) | Self::Segments(msg) | Self::Field(msg) => {
                msg
            }
        }
    }
}

/// Why one attempt of the retry loop did not commit.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AttemptFailure {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Parse(#[from] ParseFailure),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationFailure),
}

impl AttemptFailure {
    /// Content defects feed the next prompt; backend failures do not.
    pub fn is_content_defect(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::Validation(_))
    }

    /// Text injected into the corrective block of the next prompt.
    pub fn corrective_text(&self) -> String {
        match self {
            Self::Parse(failure) => format!(
                "Your response could not be parsed as the required JSON ({}). Respond with valid JSON only, no prose and no code fences.",
                failure.reason
            ),
            Self::Validation(failure) => failure.diagnostic().to_string(),
            Self::Backend(err) => err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{tool} is not available: {hint}")]
    BackendNotInstalled { tool: String, hint: String },

    #[error("generation cancelled")]
    Cancelled,

    #[error("nothing to generate from: {0}")]
    EmptyInput(&'static str),

    /// A backend failure another attempt cannot fix.
    #[error(transparent)]
    Backend(BackendError),

    #[error("{operation} failed after {attempts} attempt(s): {last}")]
    ExhaustedRetries {
        operation: &'static str,
        attempts: u32,
        last: Box<AttemptFailure>,
        last_raw: Option<String>,
        usage: TokenUsage,
    },
}

impl From<BackendError> for GenerationError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotInstalled { tool, hint } => Self::BackendNotInstalled { tool, hint },
            BackendError::Cancelled => Self::Cancelled,
            other => Self::Backend(other),
        }
    }
}

impl GenerationError {
    /// The last raw backend output, kept for diagnostics.
    pub fn last_raw(&self) -> Option<&str> {
        match self {
            Self::ExhaustedRetries { last_raw, .. } => last_raw.as_deref(),
            _ => None,
        }
    }

    pub fn usage(&self) -> TokenUsage {
        match self {
            Self::ExhaustedRetries { usage, .. } => *usage,
            _ => TokenUsage::zero(),
        }
    }

    /// Fold in usage spent by earlier steps of the same request.
    pub fn with_prior_usage(self, prior: TokenUsage) -> Self {
        match self {
            Self::ExhaustedRetries {
                operation,
                attempts,
                last,
                last_raw,
                usage,
            } => Self::ExhaustedRetries {
                operation,
                attempts,
                last,
                last_raw,
                usage: prior.adding(usage),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_installed_and_cancelled_are_final() {
        let missing = BackendError::NotInstalled {
            tool: "codex".into(),
            hint: "install it".into(),
        };
        assert!(!missing.is_retryable());
        assert!(!BackendError::Cancelled.is_retryable());
        assert!(BackendError::Timeout {
            after: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(BackendError::Transport("refused".into()).is_retryable());
        assert!(!BackendError::InvalidImages("bad png".into()).is_retryable());
    }

    #[test]
    fn prior_usage_is_added_to_exhausted_requests_only() {
        let spent = TokenUsage {
            input: 40,
            cached_input: 0,
            output: 10,
        };
        let exhausted = GenerationError::ExhaustedRetries {
            operation: "title",
            attempts: 3,
            last: Box::new(AttemptFailure::Validation(ValidationFailure::Field("x".into()))),
            last_raw: Some("raw".into()),
            usage: spent,
        };
        let folded = exhausted.with_prior_usage(spent);
        assert_eq!(folded.usage().input, 80);
        assert_eq!(folded.usage().output, 20);
        assert_eq!(folded.last_raw(), Some("raw"));

        let cancelled = GenerationError::Cancelled.with_prior_usage(spent);
        assert!(matches!(cancelled, GenerationError::Cancelled));
    }

    #[test]
    fn validation_text_is_passed_through_verbatim() {
        let failure = AttemptFailure::from(ValidationFailure::Duration("card X is 4 minutes".into()));
        assert!(failure.is_content_defect());
        assert_eq!(failure.corrective_text(), "card X is 4 minutes");
    }
}
