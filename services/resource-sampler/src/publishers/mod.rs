//! Telemetry publishers module
//!
//! Destinations for captured samples: the in-memory buffer behind
//! `latest`/`snapshot`, the two file conventions (JSON array flushed at stop,
//! JSON lines streamed per sample) and the Redis exporter.

pub mod file;
pub mod memory;
pub mod redis;
pub mod traits;

pub use file::{parse_samples, read_samples, write_json_array, JsonLinesSink};
pub use memory::SampleBuffer;
pub use self::redis::{gauges, publish_latest, Envelope, RedisPublisher};
pub use traits::*;
