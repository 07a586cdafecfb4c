//! Null accelerator backend.

use super::traits::{AcceleratorMetrics, DeviceReading};
use crate::error::{Result, SamplerError};

/// Accelerator provider for hosts without any supported accelerator.
///
/// `initialize` always fails, so samplers run with empty accelerator data.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unavailable;

impl AcceleratorMetrics for Unavailable {
    fn name(&self) -> &'static str {
        "none"
    }

    fn initialize(&mut self) -> Result<()> {
        Err(SamplerError::ProviderUnavailable(
            "no accelerator backend configured".to_string(),
        ))
    }

    fn device_count(&mut self) -> Result<u32> {
        Ok(0)
    }

    fn query(&mut self, device: u32) -> Result<DeviceReading> {
        Err(SamplerError::device(device, "no accelerator backend configured"))
    }

    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}
