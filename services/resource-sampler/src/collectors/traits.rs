//! Provider interfaces consumed by the capture loop.

use crate::error::Result;
use crate::sample::bytes_to_gb;

/// Host memory usage at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryReading {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl MemoryReading {
    pub fn used_gb(&self) -> f64 {
        bytes_to_gb(self.used_bytes)
    }

    /// Percentage of total memory in use, 0 when the total is unknown.
    pub fn percent(&self) -> f32 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.used_bytes as f64 / self.total_bytes as f64 * 100.0) as f32
    }
}

/// Raw reading for one accelerator device, memory in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceReading {
    pub utilization_percent: f32,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: Option<u64>,
    pub temperature_celsius: Option<f32>,
}

/// Source of host CPU and memory statistics.
///
/// Host metrics are assumed to always be obtainable; an error here ends the
/// sampling run.
pub trait HostMetrics: Send {
    /// CPU utilization across all cores since the previous call.
    fn cpu_percent(&mut self) -> Result<f32>;

    fn memory(&mut self) -> Result<MemoryReading>;
}

/// Source of per-device accelerator statistics.
///
/// Calls to [`device_count`](Self::device_count) and [`query`](Self::query)
/// must be bracketed by [`initialize`](Self::initialize) and
/// [`shutdown`](Self::shutdown). Every failure here is treated as
/// best-effort by callers.
pub trait AcceleratorMetrics: Send {
    /// Short backend name for log output.
    fn name(&self) -> &'static str;

    /// Open a session. Fails with `ProviderUnavailable` when no compatible
    /// driver or tool is present.
    fn initialize(&mut self) -> Result<()>;

    /// Number of devices enumerated by the last successful `initialize`.
    fn device_count(&mut self) -> Result<u32>;

    /// Query one device. Fails with `DeviceQuery` for that device only.
    fn query(&mut self, device: u32) -> Result<DeviceReading>;

    fn shutdown(&mut self) -> Result<()>;
}
