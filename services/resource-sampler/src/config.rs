//! Layered configuration for samplers and the monitor process.
//!
//! Sources, lowest to highest precedence: built-in defaults, an optional
//! config file (format chosen by extension), then `SAMPLER_*` environment
//! variables with `__` separating nested keys (`SAMPLER_REDIS__URL`).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SamplerError};

const ENV_PREFIX: &str = "SAMPLER";

/// Default polling period of the standalone monitor.
pub const MONITOR_INTERVAL_SECS: f64 = 5.0;
/// Default output of the standalone monitor.
pub const MONITOR_OUTPUT: &str = "logs/system_metrics.jsonl";

/// How samples are written to the destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkFormat {
    /// One JSON array, written once when the sampler stops.
    #[default]
    Json,
    /// One JSON object per line, appended as each sample is taken.
    Jsonl,
}

impl SinkFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkFormat::Json => "json",
            SinkFormat::Jsonl => "jsonl",
        }
    }
}

/// Accelerator backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceleratorBackend {
    #[default]
    Auto,
    NvidiaSmi,
    None,
}

impl FromStr for AcceleratorBackend {
    type Err = SamplerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "auto" => Ok(Self::Auto),
            "nvidia_smi" | "nvidia" => Ok(Self::NvidiaSmi),
            "none" | "off" => Ok(Self::None),
            other => Err(SamplerError::Config(config::ConfigError::Message(format!(
                "unknown accelerator backend {other:?}"
            )))),
        }
    }
}

impl fmt::Display for AcceleratorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::NvidiaSmi => "nvidia_smi",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

/// Where exported samples go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    /// Prefix for the `<prefix>:latest` hash and `<prefix>:samples` channel.
    pub key_prefix: String,
    /// Job label attached to published envelopes.
    pub job: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "telemetry".to_string(),
            job: "llm-training".to_string(),
        }
    }
}

/// Sampler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Polling period in seconds.
    pub interval_secs: f64,
    /// Destination file; samples stay in memory only when unset.
    pub output: Option<PathBuf>,
    pub format: SinkFormat,
    pub accelerator: AcceleratorBackend,
    /// Path or name of the `nvidia-smi` binary.
    pub nvidia_smi: String,
    pub redis: RedisConfig,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2.0,
            output: None,
            format: SinkFormat::Json,
            accelerator: AcceleratorBackend::Auto,
            nvidia_smi: "nvidia-smi".to_string(),
            redis: RedisConfig::default(),
        }
    }
}

impl SamplerConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_layered(file, SamplerConfig::default())
    }

    /// Same as [`load`](Self::load) with the standalone monitor's defaults:
    /// a 5 second interval streaming to [`MONITOR_OUTPUT`].
    pub fn load_monitor(file: Option<&Path>) -> Result<Self> {
        Self::load_layered(file, SamplerConfig::monitor_defaults())
    }

    pub fn monitor_defaults() -> Self {
        Self {
            interval_secs: MONITOR_INTERVAL_SECS,
            output: Some(PathBuf::from(MONITOR_OUTPUT)),
            format: SinkFormat::Jsonl,
            ..Self::default()
        }
    }

    fn load_layered(file: Option<&Path>, defaults: SamplerConfig) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("interval_secs", defaults.interval_secs)?
            .set_default("format", defaults.format.as_str())?
            .set_default("accelerator", defaults.accelerator.to_string())?
            .set_default("nvidia_smi", defaults.nvidia_smi)?
            .set_default("redis.url", defaults.redis.url)?
            .set_default("redis.key_prefix", defaults.redis.key_prefix)?
            .set_default("redis.job", defaults.redis.job)?;

        if let Some(output) = defaults.output {
            builder = builder.set_default("output", output.to_string_lossy().into_owned())?;
        }
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: SamplerConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject intervals that are not strictly positive.
    pub fn validate(&self) -> Result<()> {
        interval_from_secs(self.interval_secs).map(|_| ())
    }

    pub fn interval(&self) -> Result<Duration> {
        interval_from_secs(self.interval_secs)
    }
}

/// Convert a polling period in seconds to a `Duration`, rejecting zero,
/// negative and non-finite values.
pub fn interval_from_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(SamplerError::InvalidInterval(secs));
    }
    if secs < 1.0 {
        warn!(
            interval_secs = secs,
            "sampling interval below one second adds measurable overhead"
        );
    }
    Duration::try_from_secs_f64(secs).map_err(|_| SamplerError::InvalidInterval(secs))
}
