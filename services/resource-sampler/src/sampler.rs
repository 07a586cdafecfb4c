//! In-process background resource sampler.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use resource_sampler::ResourceSampler;
//!
//! # fn train() {}
//! let sampler = ResourceSampler::builder()
//!     .interval(Duration::from_secs(2))
//!     .destination("outputs/run-1/resources.json")
//!     .build()?;
//!
//! {
//!     let _guard = sampler.scoped()?;
//!     train();
//! } // stopped and flushed here, even on panic
//!
//! println!("{} samples", sampler.snapshot().len());
//! # Ok::<(), resource_sampler::SamplerError>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::capture::{Capture, CaptureSummary};
use crate::collectors::{accelerator_for, AcceleratorMetrics, HostMetrics, SystemCollector};
use crate::config::{interval_from_secs, SamplerConfig, SinkFormat};
use crate::error::{Result, SamplerError};
use crate::publishers::{write_json_array, JsonLinesSink, SampleBuffer, SampleSink};
use crate::sample::Sample;
use crate::stop::StopSignal;

const THREAD_NAME: &str = "resource-sampler";

enum Lifecycle {
    Idle {
        host: Box<dyn HostMetrics>,
        accelerator: Box<dyn AcceleratorMetrics>,
    },
    Active(Worker),
    Stopped,
}

struct Worker {
    handle: JoinHandle<Result<CaptureSummary>>,
    done: Receiver<()>,
}

impl Worker {
    /// Wait up to `timeout` for the loop to exit. `Ok(None)` means the worker
    /// did not finish in time and was left detached.
    fn wait(self, timeout: Duration) -> Result<Option<CaptureSummary>> {
        match self.done.recv_timeout(timeout) {
            // Disconnected without a message means the worker unwound.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match self.handle.join() {
                Ok(result) => result.map(Some),
                Err(_) => Err(SamplerError::WorkerPanicked),
            },
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "sampler worker did not stop in time; detaching"
                );
                Ok(None)
            }
        }
    }
}

/// Periodically samples host and accelerator usage on a background thread.
///
/// The sampler is single-use: `Idle` → `start` → `Active` → `stop` →
/// `Stopped`. Starting an active sampler fails with `AlreadyRunning`, and a
/// stopped sampler cannot be restarted (`AlreadyStopped`). `stop` is
/// idempotent and is a no-op on a sampler that never started.
///
/// All methods take `&self`, so a sampler can be shared with cleanup or
/// signal-handling code through an `Arc`.
pub struct ResourceSampler {
    interval: Duration,
    destination: Option<PathBuf>,
    format: SinkFormat,
    samples: SampleBuffer,
    stop: StopSignal,
    state: Mutex<Lifecycle>,
}

impl ResourceSampler {
    pub fn builder() -> ResourceSamplerBuilder {
        ResourceSamplerBuilder::default()
    }

    /// Build a sampler with the system host collector and the configured
    /// accelerator backend.
    pub fn from_config(config: &SamplerConfig) -> Result<Self> {
        let mut builder = Self::builder()
            .interval_secs(config.interval_secs)
            .format(config.format)
            .accelerator(accelerator_for(config));
        if let Some(output) = &config.output {
            builder = builder.destination(output);
        }
        builder.build()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    /// Spawn the sampling thread.
    ///
    /// If the destination cannot be opened the sampler stays idle and `start`
    /// may be retried. If the thread itself cannot be spawned the collectors
    /// are lost with it, so the sampler is left stopped and a later `start`
    /// returns `AlreadyStopped`.
    pub fn start(&self) -> Result<()> {
        let mut state = self.lock_state();
        let (host, accelerator) = match std::mem::replace(&mut *state, Lifecycle::Stopped) {
            Lifecycle::Idle { host, accelerator } => (host, accelerator),
            Lifecycle::Active(worker) => {
                *state = Lifecycle::Active(worker);
                return Err(SamplerError::AlreadyRunning);
            }
            Lifecycle::Stopped => return Err(SamplerError::AlreadyStopped),
        };

        let mut sinks = match self.sinks() {
            Ok(sinks) => sinks,
            Err(e) => {
                *state = Lifecycle::Idle { host, accelerator };
                return Err(e);
            }
        };

        let capture = Capture::new(host, accelerator, self.interval);
        let stop = self.stop.clone();
        let (done_tx, done) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let result = capture.run(&stop, &mut sinks);
                let _ = done_tx.send(());
                result
            })
            .map_err(SamplerError::Spawn)?;

        *state = Lifecycle::Active(Worker { handle, done });
        info!(
            interval_ms = self.interval.as_millis() as u64,
            destination = ?self.destination,
            "resource sampler started"
        );
        Ok(())
    }

    /// Stop sampling and persist the collected samples.
    ///
    /// Waits at most twice the polling interval for the worker. In `json`
    /// format the full sequence is written to the destination here. A
    /// destination write failure or a host metrics failure during the run is
    /// returned; calling `stop` again afterwards is a no-op.
    pub fn stop(&self) -> Result<()> {
        let worker = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, Lifecycle::Stopped) {
                Lifecycle::Active(worker) => worker,
                other => {
                    *state = other;
                    return Ok(());
                }
            }
        };

        self.stop.trigger();
        let outcome = worker.wait(self.interval.saturating_mul(2));
        let flushed = self.flush();

        match &outcome {
            Ok(Some(summary)) => info!(samples = summary.samples, "resource sampler stopped"),
            Ok(None) => info!(samples = self.samples.len(), "resource sampler stopped"),
            Err(e) => warn!(error = %e, "resource sampler run failed"),
        }
        flushed?;
        outcome.map(|_| ())
    }

    /// Start now and stop when the returned guard goes out of scope.
    pub fn scoped(&self) -> Result<SamplerGuard<'_>> {
        self.start()?;
        Ok(SamplerGuard {
            sampler: self,
            finished: false,
        })
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.lock_state(), Lifecycle::Active(_))
    }

    /// Most recent sample, without waiting on the sampling thread.
    pub fn latest(&self) -> Option<Sample> {
        self.samples.latest()
    }

    /// Copy of every sample taken so far.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.snapshot()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn sinks(&self) -> Result<Vec<Box<dyn SampleSink>>> {
        let mut sinks: Vec<Box<dyn SampleSink>> = vec![Box::new(self.samples.clone())];
        if let (SinkFormat::Jsonl, Some(path)) = (self.format, &self.destination) {
            sinks.push(Box::new(JsonLinesSink::create(path)?));
        }
        Ok(sinks)
    }

    fn flush(&self) -> Result<()> {
        match (self.format, &self.destination) {
            (SinkFormat::Json, Some(path)) => write_json_array(path, &self.samples.snapshot()),
            // Streamed by the worker as samples were taken.
            (SinkFormat::Jsonl, _) | (_, None) => Ok(()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, Lifecycle> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ResourceSampler {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "resource sampler failed to stop cleanly");
        }
    }
}

/// Stops its sampler when dropped, including during unwinding.
#[must_use = "the sampler stops as soon as the guard is dropped"]
pub struct SamplerGuard<'a> {
    sampler: &'a ResourceSampler,
    finished: bool,
}

impl SamplerGuard<'_> {
    pub fn sampler(&self) -> &ResourceSampler {
        self.sampler
    }

    /// Stop the sampler now and report the result.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.sampler.stop()
    }
}

impl Drop for SamplerGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.sampler.stop() {
            warn!(error = %e, "resource sampler failed to stop cleanly");
        }
    }
}

/// Builder for [`ResourceSampler`].
pub struct ResourceSamplerBuilder {
    interval_secs: f64,
    destination: Option<PathBuf>,
    format: SinkFormat,
    host: Option<Box<dyn HostMetrics>>,
    accelerator: Option<Box<dyn AcceleratorMetrics>>,
}

impl Default for ResourceSamplerBuilder {
    fn default() -> Self {
        Self {
            interval_secs: SamplerConfig::default().interval_secs,
            destination: None,
            format: SinkFormat::default(),
            host: None,
            accelerator: None,
        }
    }
}

impl ResourceSamplerBuilder {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval_secs = interval.as_secs_f64();
        self
    }

    pub fn interval_secs(mut self, secs: f64) -> Self {
        self.interval_secs = secs;
        self
    }

    pub fn destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.destination = Some(path.into());
        self
    }

    pub fn format(mut self, format: SinkFormat) -> Self {
        self.format = format;
        self
    }

    /// Override the host collector (defaults to [`SystemCollector`]).
    pub fn host(mut self, host: Box<dyn HostMetrics>) -> Self {
        self.host = Some(host);
        self
    }

    /// Override the accelerator provider (defaults to `nvidia-smi` probing).
    pub fn accelerator(mut self, accelerator: Box<dyn AcceleratorMetrics>) -> Self {
        self.accelerator = Some(accelerator);
        self
    }

    pub fn build(self) -> Result<ResourceSampler> {
        let interval = interval_from_secs(self.interval_secs)?;
        let host = match self.host {
            Some(host) => host,
            None => Box::new(SystemCollector::new()?),
        };
        let accelerator = self
            .accelerator
            .unwrap_or_else(|| accelerator_for(&SamplerConfig::default()));

        Ok(ResourceSampler {
            interval,
            destination: self.destination,
            format: self.format,
            samples: SampleBuffer::new(),
            stop: StopSignal::new(),
            state: Mutex::new(Lifecycle::Idle { host, accelerator }),
        })
    }
}
