//! NVIDIA accelerator collector that shells out to `nvidia-smi`.

use std::process::Command;

use tracing::{debug, info};

use super::traits::{AcceleratorMetrics, DeviceReading};
use crate::error::{Result, SamplerError};

const BYTES_PER_MIB: u64 = 1024 * 1024;
const QUERY_FIELDS: &str = "utilization.gpu,memory.used,memory.total,temperature.gpu";

/// Accelerator metrics read through the `nvidia-smi` command line tool.
///
/// `initialize` doubles as the capability probe: a missing binary or a
/// failing driver surfaces as `ProviderUnavailable`.
#[derive(Debug)]
pub struct NvidiaSmi {
    program: String,
    devices: Vec<u32>,
    initialized: bool,
}

impl NvidiaSmi {
    /// Use `program` as the path to `nvidia-smi`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            devices: Vec::new(),
            initialized: false,
        }
    }

    fn run(&self, args: &[&str]) -> std::result::Result<String, String> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| format!("failed to run {}: {e}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("{} exited with {}: {}", self.program, output.status, stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for NvidiaSmi {
    fn default() -> Self {
        Self::new("nvidia-smi")
    }
}

impl AcceleratorMetrics for NvidiaSmi {
    fn name(&self) -> &'static str {
        "nvidia-smi"
    }

    fn initialize(&mut self) -> Result<()> {
        let stdout = self
            .run(&["--query-gpu=index", "--format=csv,noheader"])
            .map_err(SamplerError::ProviderUnavailable)?;

        self.devices = parse_indices(&stdout).map_err(SamplerError::ProviderUnavailable)?;
        self.initialized = true;
        info!(devices = self.devices.len(), "nvidia-smi session opened");
        Ok(())
    }

    fn device_count(&mut self) -> Result<u32> {
        if !self.initialized {
            return Err(SamplerError::ProviderUnavailable(
                "nvidia-smi session not initialized".to_string(),
            ));
        }
        Ok(self.devices.len() as u32)
    }

    fn query(&mut self, device: u32) -> Result<DeviceReading> {
        if !self.devices.contains(&device) {
            return Err(SamplerError::device(device, "device was not enumerated"));
        }

        let id = format!("--id={device}");
        let query = format!("--query-gpu={QUERY_FIELDS}");
        let stdout = self
            .run(&[query.as_str(), "--format=csv,noheader,nounits", id.as_str()])
            .map_err(|reason| SamplerError::device(device, reason))?;

        let line = stdout.lines().next().unwrap_or_default();
        parse_query_line(line).map_err(|reason| SamplerError::device(device, reason))
    }

    fn shutdown(&mut self) -> Result<()> {
        debug!("nvidia-smi session closed");
        self.devices.clear();
        self.initialized = false;
        Ok(())
    }
}

fn parse_indices(stdout: &str) -> std::result::Result<Vec<u32>, String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<u32>()
                .map_err(|_| format!("unexpected device index {line:?}"))
        })
        .collect()
}

/// Parse one `utilization, used MiB, total MiB, temperature` CSV line.
fn parse_query_line(line: &str) -> std::result::Result<DeviceReading, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(format!("expected 4 fields, got {line:?}"));
    }

    let utilization_percent = fields[0]
        .parse::<f32>()
        .map_err(|_| format!("bad utilization {:?}", fields[0]))?;
    let memory_used_mib = fields[1]
        .parse::<u64>()
        .map_err(|_| format!("bad memory.used {:?}", fields[1]))?;

    let memory_used_bytes = mib_to_bytes(memory_used_mib)?;
    let memory_total_bytes = optional(fields[2]).map(mib_to_bytes).transpose()?;

    Ok(DeviceReading {
        utilization_percent,
        memory_used_bytes,
        memory_total_bytes,
        temperature_celsius: optional(fields[3]),
    })
}

fn mib_to_bytes(mib: u64) -> std::result::Result<u64, String> {
    mib.checked_mul(BYTES_PER_MIB)
        .ok_or_else(|| format!("memory value {mib} MiB out of range"))
}

// "[N/A]" and friends mean the field is unsupported on this device.
fn optional<T: std::str::FromStr>(field: &str) -> Option<T> {
    field.parse().ok()
}
