pub mod backend;
pub mod config;
pub mod error;
pub mod generation;
pub mod models;
pub mod parsing;
pub mod prompts;
pub mod telemetry;
pub mod utils;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend::{Backend, BackendKind, LlmRunner};
pub use config::{ConfigStore, GenerationConfig};
pub use error::{BackendError, GenerationError};
pub use generation::{CardGenerator, FramePipeline, LocalCardBuilder, MergeEngine};

/// Initialize logging (reads RUST_LOG env var). Info unless overridden.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
