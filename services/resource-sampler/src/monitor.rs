//! Streaming monitor for running the sampler as its own process.
//!
//! Unlike [`ResourceSampler`](crate::ResourceSampler), nothing is buffered:
//! every sample is appended to a JSON lines file as soon as it is taken, so a
//! terminated monitor leaves a complete file behind.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::capture::{Capture, CaptureSummary};
use crate::collectors::{accelerator_for, AcceleratorMetrics, HostMetrics, SystemCollector};
use crate::config::{SamplerConfig, MONITOR_OUTPUT};
use crate::error::Result;
use crate::publishers::JsonLinesSink;
use crate::stop::StopSignal;

pub struct StreamingMonitor {
    capture: Capture,
    sink: JsonLinesSink,
    interval: Duration,
}

impl StreamingMonitor {
    /// Monitor configured from `config`, using the system host collector.
    ///
    /// Always streams JSON lines; `config.format` is ignored.
    pub fn from_config(config: &SamplerConfig) -> Result<Self> {
        let output = config
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(MONITOR_OUTPUT));
        Self::new(
            Box::new(SystemCollector::new()?),
            accelerator_for(config),
            config.interval()?,
            output,
        )
    }

    /// Monitor with explicit providers, opening `output` for appending.
    pub fn new(
        host: Box<dyn HostMetrics>,
        accelerator: Box<dyn AcceleratorMetrics>,
        interval: Duration,
        output: impl Into<PathBuf>,
    ) -> Result<Self> {
        let sink = JsonLinesSink::create(output)?;
        Ok(Self {
            capture: Capture::new(host, accelerator, interval),
            sink,
            interval,
        })
    }

    pub fn output(&self) -> &Path {
        self.sink.path()
    }

    /// Sample until `stop` fires. Blocks the calling thread.
    pub fn run(self, stop: &StopSignal) -> Result<CaptureSummary> {
        let Self {
            capture,
            mut sink,
            interval,
        } = self;
        info!(
            output = %sink.path().display(),
            interval_secs = interval.as_secs_f64(),
            "monitor running"
        );
        capture.run(stop, &mut sink)
    }
}
