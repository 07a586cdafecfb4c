//! Host CPU and memory collector backed by `sysinfo`.

use std::time::Duration;

use sysinfo::System;
use tracing::debug;

use super::traits::{HostMetrics, MemoryReading};
use crate::error::{Result, SamplerError};

/// Shortest gap between CPU refreshes that yields a fresh usage figure.
pub const MIN_CPU_REFRESH: Duration = sysinfo::MINIMUM_CPU_UPDATE_INTERVAL;

/// Host metrics read through `sysinfo`.
///
/// CPU usage is computed from the delta between consecutive refreshes, so the
/// counter is primed on construction. Readings taken less than
/// [`MIN_CPU_REFRESH`] apart may repeat the previous value.
pub struct SystemCollector {
    sys: System,
}

impl SystemCollector {
    pub fn new() -> Result<Self> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(SamplerError::HostQuery(
                "sysinfo does not support this platform".to_string(),
            ));
        }

        let mut sys = System::new();
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        debug!(cpus = sys.cpus().len(), "host collector ready");

        Ok(Self { sys })
    }
}

impl HostMetrics for SystemCollector {
    fn cpu_percent(&mut self) -> Result<f32> {
        self.sys.refresh_cpu_usage();
        Ok(self.sys.global_cpu_usage())
    }

    fn memory(&mut self) -> Result<MemoryReading> {
        self.sys.refresh_memory();
        let total_bytes = self.sys.total_memory();
        if total_bytes == 0 {
            return Err(SamplerError::HostQuery(
                "total memory reported as zero".to_string(),
            ));
        }
        Ok(MemoryReading {
            used_bytes: self.sys.used_memory(),
            total_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_host_memory() {
        let mut collector = SystemCollector::new().unwrap();
        let memory = collector.memory().unwrap();

        assert!(memory.total_bytes > 0);
        assert!(memory.used_bytes <= memory.total_bytes);
    }

    #[test]
    fn cpu_percent_is_in_range() {
        let mut collector = SystemCollector::new().unwrap();
        std::thread::sleep(MIN_CPU_REFRESH);
        let cpu = collector.cpu_percent().unwrap();

        assert!((0.0..=100.0).contains(&cpu));
    }
}
