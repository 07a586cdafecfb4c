//! Telemetry collectors module
//!
//! Traits and implementations for reading host and accelerator statistics.
//! The capture loop only ever talks to [`HostMetrics`] and
//! [`AcceleratorMetrics`]; which accelerator backend sits behind the trait is
//! decided once at startup by [`accelerator_for`].

pub mod mock;
pub mod nvidia;
pub mod system;
pub mod traits;
pub mod unavailable;

pub use nvidia::NvidiaSmi;
pub use system::{SystemCollector, MIN_CPU_REFRESH};
pub use traits::*;
pub use unavailable::Unavailable;

use crate::config::{AcceleratorBackend, SamplerConfig};

/// Select the accelerator provider configured for this run.
pub fn accelerator_for(config: &SamplerConfig) -> Box<dyn AcceleratorMetrics> {
    match config.accelerator {
        AcceleratorBackend::Auto | AcceleratorBackend::NvidiaSmi => {
            Box::new(NvidiaSmi::new(config.nvidia_smi.clone()))
        }
        AcceleratorBackend::None => Box::new(Unavailable),
    }
}
