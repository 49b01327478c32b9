//! `cardflow` command line.
//!
//! Each subcommand reads JSON inputs from files, runs one generation request
//! against the configured backend, and prints JSON to stdout. Logs go to
//! stderr (`RUST_LOG` controls the level).

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use cardflow_lib::backend::Backend;
use cardflow_lib::config::{ConfigStore, GenerationConfig};
use cardflow_lib::error::GenerationError;
use cardflow_lib::generation::{CardGenerator, FrameBatch, FramePipeline, LocalCardBuilder};
use cardflow_lib::models::{ActivityCard, Frame, Observation, TimedCard};
use cardflow_lib::telemetry::CallRecorder;

/// Turn screen observations into activity cards.
#[derive(Debug, Parser)]
#[command(name = "cardflow", version)]
struct Cli {
    /// JSON configuration file. Missing file means defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print backend call telemetry to stderr when done.
    #[arg(long, global = true)]
    telemetry: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate the revised card timeline for a window of observations.
    Cards {
        /// JSON array of observations.
        #[arg(long)]
        observations: PathBuf,

        /// JSON array of the cards already covering this window.
        #[arg(long)]
        existing: Option<PathBuf>,
    },

    /// Build one card field by field, for small local models.
    ///
    /// With `--previous`, the new card is offered for merging into it.
    Card {
        #[arg(long)]
        observations: PathBuf,

        /// JSON object `{card, startTs, endTs}` for the card before this batch.
        #[arg(long)]
        previous: Option<PathBuf>,
    },

    /// Describe screenshots and turn them into observations.
    Frames {
        #[arg(long, default_value_t = 0)]
        batch_id: i64,

        /// Epoch seconds of the first frame.
        #[arg(long)]
        batch_start: i64,

        /// Seconds between consecutive frames.
        #[arg(long, default_value_t = 10.0)]
        spacing: f64,

        /// Recording length in seconds; defaults to the last frame plus one interval.
        #[arg(long)]
        duration: Option<f64>,

        /// Screenshot files in chronological order.
        #[arg(required = true)]
        frames: Vec<PathBuf>,
    },

    /// Check that the configured backend is installed and answering.
    Probe,
}

#[tokio::main]
async fn main() {
    cardflow_lib::init_logging();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        if let Some(raw) = err
            .downcast_ref::<GenerationError>()
            .and_then(GenerationError::last_raw)
        {
            eprintln!("Last backend output:\n{raw}");
        }
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigStore::new(path.clone())?.snapshot(),
        None => Arc::new(GenerationConfig::default()),
    };

    let recorder = CallRecorder::new();
    let backend = Arc::new(Backend::from_config(&config.backend, recorder.clone())?);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("interrupted; cancelling the in-flight request");
                cancel.cancel();
            }
        });
    }

    let output = match cli.command {
        Command::Cards {
            observations,
            existing,
        } => {
            let observations: Vec<Observation> = read_json(&observations)?;
            let existing: Vec<ActivityCard> = match existing {
                Some(path) => read_json(&path)?,
                None => Vec::new(),
            };
            let generated = CardGenerator::new(backend, Arc::clone(&config))
                .generate(&observations, &existing, &cancel)
                .await?;
            json!({
                "cards": generated.value,
                "usage": generated.usage,
                "attempts": generated.attempts,
            })
        }
        Command::Card {
            observations,
            previous,
        } => {
            let observations: Vec<Observation> = read_json(&observations)?;
            let previous: Option<TimedCard> = previous.as_deref().map(read_json).transpose()?;
            let generated = LocalCardBuilder::new(backend, Arc::clone(&config))
                .build(&observations, previous.as_ref(), &cancel)
                .await?;
            json!({
                "card": generated.value.card,
                "mergedWithPrevious": generated.value.merged_with_previous,
                "usage": generated.usage,
                "attempts": generated.attempts,
            })
        }
        Command::Frames {
            batch_id,
            batch_start,
            spacing,
            duration,
            frames,
        } => {
            let batch = FrameBatch {
                batch_id,
                start_ts: batch_start,
                duration_secs: duration,
                frames: frames
                    .into_iter()
                    .enumerate()
                    .map(|(idx, path)| Frame {
                        path,
                        offset_secs: idx as f64 * spacing,
                    })
                    .collect(),
            };
            let generated = FramePipeline::new(backend, Arc::clone(&config))
                .observe(&batch, &cancel)
                .await?;
            json!({
                "observations": generated.value.observations,
                "fellBack": generated.value.fell_back,
                "usage": generated.usage,
            })
        }
        Command::Probe => {
            let report = backend
                .probe(config.backend.probe_timeout(), &cancel)
                .await?;
            serde_json::to_value(report)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    if cli.telemetry {
        let stats = recorder.snapshot().await;
        eprintln!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Invalid JSON in {}", path.display()))
}
