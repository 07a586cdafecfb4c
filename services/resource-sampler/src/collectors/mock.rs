//! Deterministic providers for tests and demos.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::traits::{AcceleratorMetrics, DeviceReading, HostMetrics, MemoryReading};
use crate::error::{Result, SamplerError};

/// Host provider returning constant readings.
#[derive(Debug, Clone)]
pub struct FixedHost {
    cpu_percent: f32,
    memory: MemoryReading,
    remaining: Option<usize>,
}

impl FixedHost {
    pub fn new(cpu_percent: f32, used_bytes: u64, total_bytes: u64) -> Self {
        Self {
            cpu_percent,
            memory: MemoryReading {
                used_bytes,
                total_bytes,
            },
            remaining: None,
        }
    }

    /// Fail every CPU query after `successes` successful ones.
    pub fn fail_after(mut self, successes: usize) -> Self {
        self.remaining = Some(successes);
        self
    }
}

impl Default for FixedHost {
    fn default() -> Self {
        Self::new(25.0, 4 * 1024 * 1024 * 1024, 16 * 1024 * 1024 * 1024)
    }
}

impl HostMetrics for FixedHost {
    fn cpu_percent(&mut self) -> Result<f32> {
        match self.remaining.as_mut() {
            Some(0) => Err(SamplerError::HostQuery("simulated host failure".to_string())),
            Some(n) => {
                *n -= 1;
                Ok(self.cpu_percent)
            }
            None => Ok(self.cpu_percent),
        }
    }

    fn memory(&mut self) -> Result<MemoryReading> {
        Ok(self.memory)
    }
}

/// Simulated multi-device accelerator.
#[derive(Debug, Clone)]
pub struct SimulatedAccelerator {
    devices: u32,
    fail_init: bool,
    failing: BTreeSet<u32>,
    initialized: bool,
    shutdowns: Arc<AtomicUsize>,
}

impl SimulatedAccelerator {
    pub fn new(devices: u32) -> Self {
        Self {
            devices,
            fail_init: false,
            failing: BTreeSet::new(),
            initialized: false,
            shutdowns: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make `initialize` fail with `ProviderUnavailable`.
    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Make every query for `device` fail.
    pub fn failing_device(mut self, device: u32) -> Self {
        self.failing.insert(device);
        self
    }

    /// Counter incremented on every `shutdown`, shared with clones.
    pub fn shutdown_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.shutdowns)
    }

    /// Reading reported for `device`.
    pub fn reading(device: u32) -> DeviceReading {
        DeviceReading {
            utilization_percent: 50.0 + device as f32,
            memory_used_bytes: (u64::from(device) + 1) * 1024 * 1024 * 1024,
            memory_total_bytes: Some(24 * 1024 * 1024 * 1024),
            temperature_celsius: Some(60.0),
        }
    }
}

impl AcceleratorMetrics for SimulatedAccelerator {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn initialize(&mut self) -> Result<()> {
        if self.fail_init {
            return Err(SamplerError::ProviderUnavailable(
                "simulated driver missing".to_string(),
            ));
        }
        self.initialized = true;
        Ok(())
    }

    fn device_count(&mut self) -> Result<u32> {
        if !self.initialized {
            return Err(SamplerError::ProviderUnavailable("not initialized".to_string()));
        }
        Ok(self.devices)
    }

    fn query(&mut self, device: u32) -> Result<DeviceReading> {
        if !self.initialized || device >= self.devices || self.failing.contains(&device) {
            return Err(SamplerError::device(device, "simulated query failure"));
        }
        Ok(Self::reading(device))
    }

    fn shutdown(&mut self) -> Result<()> {
        self.initialized = false;
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
