//! Background CPU and GPU telemetry for long-running training and inference
//! jobs.
//!
//! Two ways to run the same sampling loop:
//!
//! - [`ResourceSampler`]: a background thread inside the job's own process,
//!   usually wrapped around the workload with [`ResourceSampler::scoped`].
//!   Samples are kept in memory and written out when the sampler stops.
//! - [`StreamingMonitor`]: a standalone process that appends one JSON line
//!   per sample until it is told to stop.
//!
//! Host statistics come from [`collectors::SystemCollector`]; accelerator
//! statistics are optional and come from whichever
//! [`collectors::AcceleratorMetrics`] backend is configured.

pub mod capture;
pub mod collectors;
pub mod config;
pub mod error;
pub mod monitor;
pub mod publishers;
pub mod sample;
pub mod sampler;
pub mod stop;

pub use capture::{collect_once, Capture, CaptureSummary};
pub use config::{AcceleratorBackend, RedisConfig, SamplerConfig, SinkFormat};
pub use error::{Result, SamplerError};
pub use monitor::StreamingMonitor;
pub use sample::{AcceleratorReading, Sample};
pub use sampler::{ResourceSampler, ResourceSamplerBuilder, SamplerGuard};
pub use stop::StopSignal;
