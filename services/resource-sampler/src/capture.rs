//! The sampling loop shared by the in-process sampler and the monitor
//! process.
//!
//! Host readings are mandatory and any failure ends the run. Accelerator
//! readings are best-effort: a failed `initialize` leaves every sample without
//! accelerator data, and a failed per-device query only drops that device
//! from that one sample.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::collectors::{AcceleratorMetrics, HostMetrics};
use crate::error::{Result, SamplerError};
use crate::publishers::SampleSink;
use crate::sample::{AcceleratorReading, Sample};
use crate::stop::StopSignal;

/// Outcome of a completed capture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureSummary {
    /// Samples handed to the sink.
    pub samples: usize,
    /// Accelerator devices enumerated at startup.
    pub devices: u32,
}

/// A configured sampling loop, consumed by [`Capture::run`].
pub struct Capture {
    host: Box<dyn HostMetrics>,
    accelerator: Box<dyn AcceleratorMetrics>,
    interval: Duration,
}

impl Capture {
    pub fn new(
        host: Box<dyn HostMetrics>,
        accelerator: Box<dyn AcceleratorMetrics>,
        interval: Duration,
    ) -> Self {
        Self {
            host,
            accelerator,
            interval,
        }
    }

    /// Sample until `stop` fires, feeding every sample to `sink`.
    ///
    /// Sink errors do not interrupt sampling; the first one is returned once
    /// the loop has ended and the sink has been finished. The accelerator
    /// session is always closed before returning.
    pub fn run(mut self, stop: &StopSignal, sink: &mut dyn SampleSink) -> Result<CaptureSummary> {
        let session = open_session(self.accelerator.as_mut());
        let devices = session.as_deref().unwrap_or_default();
        let mut summary = CaptureSummary {
            samples: 0,
            devices: devices.len() as u32,
        };
        info!(
            interval_ms = self.interval.as_millis() as u64,
            devices = summary.devices,
            "sampling started"
        );

        let mut last: Option<DateTime<Utc>> = None;
        let mut sink_error: Option<SamplerError> = None;

        let outcome = loop {
            if stop.is_triggered() {
                break Ok(());
            }

            let sample = match take_sample(
                self.host.as_mut(),
                self.accelerator.as_mut(),
                devices,
                last,
            ) {
                Ok(sample) => sample,
                Err(e) => break Err(e),
            };
            last = Some(sample.timestamp);

            if let Err(e) = sink.append(&sample) {
                if sink_error.is_none() {
                    warn!(error = %e, "failed to persist sample; will report on stop");
                    sink_error = Some(e);
                }
            }
            summary.samples += 1;

            if stop.wait_timeout(self.interval) {
                break Ok(());
            }
        };

        if session.is_some() {
            close_session(self.accelerator.as_mut());
        }
        let finished = sink.finish();
        info!(samples = summary.samples, "sampling stopped");

        outcome?;
        if let Some(e) = sink_error {
            return Err(e);
        }
        finished?;
        Ok(summary)
    }
}

/// Take one sample with its own accelerator session.
pub fn collect_once(
    host: &mut dyn HostMetrics,
    accelerator: &mut dyn AcceleratorMetrics,
) -> Result<Sample> {
    let session = open_session(accelerator);
    let sample = take_sample(
        host,
        accelerator,
        session.as_deref().unwrap_or_default(),
        None,
    );
    if session.is_some() {
        close_session(accelerator);
    }
    sample
}

/// Initialize the provider and enumerate its devices.
///
/// `None` means no session was acquired. A session with a failing device
/// enumeration is kept open with no devices so it still gets shut down.
fn open_session(accelerator: &mut dyn AcceleratorMetrics) -> Option<Vec<u32>> {
    if let Err(e) = accelerator.initialize() {
        info!(backend = accelerator.name(), reason = %e, "accelerator metrics disabled");
        return None;
    }
    match accelerator.device_count() {
        Ok(count) => Some((0..count).collect()),
        Err(e) => {
            warn!(backend = accelerator.name(), error = %e, "failed to enumerate accelerators");
            Some(Vec::new())
        }
    }
}

fn close_session(accelerator: &mut dyn AcceleratorMetrics) {
    if let Err(e) = accelerator.shutdown() {
        debug!(backend = accelerator.name(), error = %e, "ignoring accelerator shutdown error");
    }
}

fn take_sample(
    host: &mut dyn HostMetrics,
    accelerator: &mut dyn AcceleratorMetrics,
    devices: &[u32],
    last: Option<DateTime<Utc>>,
) -> Result<Sample> {
    // Wall clocks can step backwards; samples never do.
    let now = Utc::now();
    let timestamp = last.map_or(now, |prev| prev.max(now));

    let cpu_util = host.cpu_percent()?;
    let memory = host.memory()?;
    let mut sample = Sample::from_host(timestamp, cpu_util, memory);
    sample.accelerators = query_devices(accelerator, devices);

    debug!(
        cpu_util = sample.cpu_util,
        cpu_mem_gb = sample.cpu_mem_gb,
        devices = sample.accelerators.len(),
        "sample taken"
    );
    Ok(sample)
}

fn query_devices(
    accelerator: &mut dyn AcceleratorMetrics,
    devices: &[u32],
) -> BTreeMap<u32, AcceleratorReading> {
    let mut readings = BTreeMap::new();
    for &device in devices {
        match accelerator.query(device) {
            Ok(reading) => {
                readings.insert(device, reading.into());
            }
            Err(e) => debug!(device, error = %e, "skipping device for this sample"),
        }
    }
    readings
}
