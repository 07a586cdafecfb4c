//! Error types for the resource sampler.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SamplerError>;

/// Errors raised while sampling, persisting or exporting telemetry.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// Host metrics could not be read. Ends the sampling run.
    #[error("host metrics unavailable: {0}")]
    HostQuery(String),

    /// No usable accelerator driver or tool on this host.
    #[error("accelerator provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A single device failed to answer a query.
    #[error("accelerator device {device} query failed: {reason}")]
    DeviceQuery { device: u32, reason: String },

    #[error("sampling interval must be a positive number of seconds, got {0}")]
    InvalidInterval(f64),

    #[error("sampler is already running")]
    AlreadyRunning,

    #[error("sampler was stopped and cannot be restarted")]
    AlreadyStopped,

    #[error("sampler worker thread panicked")]
    WorkerPanicked,

    #[error("failed to spawn sampler worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl SamplerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SamplerError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn device(device: u32, reason: impl Into<String>) -> Self {
        SamplerError::DeviceQuery {
            device,
            reason: reason.into(),
        }
    }
}
