use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use resource_sampler::AcceleratorBackend;

/// Lightweight CPU/GPU monitor for training and inference runs.
#[derive(Debug, Parser)]
#[command(name = "resource-monitor", version, about)]
pub struct Cli {
    /// Configuration file (toml, yaml, json); `SAMPLER_*` env vars override it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sample until SIGINT/SIGTERM, appending one JSON line per sample.
    Run(RunArgs),
    /// Print a single sample as JSON.
    Snapshot(SnapshotArgs),
    /// Publish the last stored sample to Redis.
    Export(ExportArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Sampling interval in seconds [default: 5].
    #[arg(long)]
    pub interval: Option<f64>,

    /// Output file, created with its parent directories if missing
    /// [default: logs/system_metrics.jsonl].
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Accelerator backend: auto, nvidia_smi or none.
    #[arg(long)]
    pub accelerator: Option<AcceleratorBackend>,
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Accelerator backend: auto, nvidia_smi or none.
    #[arg(long)]
    pub accelerator: Option<AcceleratorBackend>,

    /// Pretty-print the sample.
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Stored samples, either a JSON array or JSON lines.
    #[arg(long)]
    pub metrics: PathBuf,

    /// Redis connection URL.
    #[arg(long)]
    pub redis_url: Option<String>,

    /// Job label attached to the published sample.
    #[arg(long)]
    pub job: Option<String>,
}
