//! Standalone resource monitor.
//!
//! Runs the shared sampling loop in its own process so a training or
//! inference job can be observed without linking the sampler in. Samples are
//! appended as JSON lines until SIGINT or SIGTERM arrives.

mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use resource_sampler::collectors::{MIN_CPU_REFRESH, SystemCollector, accelerator_for};
use resource_sampler::publishers::{RedisPublisher, publish_latest};
use resource_sampler::{Sample, SamplerConfig, StopSignal, StreamingMonitor, collect_once};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, ExportArgs, RunArgs, SnapshotArgs};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Run(args) => run(config_path, args).await,
        Command::Snapshot(args) => snapshot(config_path, args).await,
        Command::Export(args) => export(config_path, args).await,
    }
}

// Logs go to stderr so `snapshot` output on stdout stays machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .init();
}

async fn run(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let mut config =
        SamplerConfig::load_monitor(config_path).context("failed to load configuration")?;
    if let Some(interval) = args.interval {
        config.interval_secs = interval;
    }
    if let Some(output) = args.output {
        config.output = Some(output);
    }
    if let Some(backend) = args.accelerator {
        config.accelerator = backend;
    }
    config.validate()?;

    let monitor = StreamingMonitor::from_config(&config).context("failed to start monitor")?;
    let output = monitor.output().to_path_buf();
    let stop = StopSignal::new();
    let mut capture = tokio::task::spawn_blocking({
        let stop = stop.clone();
        move || monitor.run(&stop)
    });

    let summary = tokio::select! {
        finished = &mut capture => finished.context("monitor task failed")??,
        () = shutdown_signal() => {
            info!("shutdown requested, finishing in-flight sample");
            stop.trigger();
            capture.await.context("monitor task failed")??
        }
    };

    info!(
        samples = summary.samples,
        devices = summary.devices,
        output = %output.display(),
        "monitor exited"
    );
    Ok(())
}

async fn snapshot(config_path: Option<&Path>, args: SnapshotArgs) -> Result<()> {
    let mut config = SamplerConfig::load(config_path).context("failed to load configuration")?;
    if let Some(backend) = args.accelerator {
        config.accelerator = backend;
    }

    let sample = tokio::task::spawn_blocking(move || -> resource_sampler::Result<Sample> {
        let mut host = SystemCollector::new()?;
        // The first CPU reading needs a baseline to diff against.
        std::thread::sleep(MIN_CPU_REFRESH);
        let mut accelerator = accelerator_for(&config);
        collect_once(&mut host, accelerator.as_mut())
    })
    .await
    .context("snapshot task failed")??;

    let json = if args.pretty {
        serde_json::to_string_pretty(&sample)?
    } else {
        serde_json::to_string(&sample)?
    };
    println!("{json}");
    Ok(())
}

async fn export(config_path: Option<&Path>, args: ExportArgs) -> Result<()> {
    let mut config = SamplerConfig::load(config_path).context("failed to load configuration")?;
    if let Some(url) = args.redis_url {
        config.redis.url = url;
    }
    if let Some(job) = args.job {
        config.redis.job = job;
    }

    let publisher = RedisPublisher::connect(&config.redis)
        .await
        .with_context(|| format!("failed to connect to {}", config.redis.url))?;
    let exported = publish_latest(&args.metrics, &publisher)
        .await
        .with_context(|| format!("failed to export {}", args.metrics.display()))?;

    if let Some(sample) = exported {
        info!(
            timestamp = %sample.timestamp,
            channel = %publisher.channel(),
            "exported latest sample"
        );
    }
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
