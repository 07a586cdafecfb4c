//! Redis publisher implementation.
//!
//! Each published sample updates the gauge hash `<prefix>:latest` and is
//! broadcast on the `<prefix>:samples` channel wrapped in an [`Envelope`].

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::file::read_samples;
use super::traits::Publisher;
use crate::config::RedisConfig;
use crate::error::Result;
use crate::sample::Sample;

/// Message published on the samples channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub job: String,
    pub published_at: DateTime<Utc>,
    pub sample: Sample,
}

impl Envelope {
    pub fn new(job: impl Into<String>, sample: Sample) -> Self {
        Self {
            id: Uuid::new_v4(),
            job: job.into(),
            published_at: Utc::now(),
            sample,
        }
    }
}

/// Flatten a sample into gauge name/value pairs.
pub fn gauges(sample: &Sample) -> Vec<(String, f64)> {
    let mut fields = vec![
        ("cpu_util".to_string(), f64::from(sample.cpu_util)),
        ("cpu_mem_gb".to_string(), sample.cpu_mem_gb),
        ("cpu_mem_percent".to_string(), f64::from(sample.cpu_mem_percent)),
    ];
    for (index, reading) in &sample.accelerators {
        fields.push((format!("gpu_util:{index}"), f64::from(reading.utilization_percent)));
        fields.push((format!("gpu_mem_gb:{index}"), reading.memory_used_gb));
    }
    fields
}

/// Publishes samples to Redis over a multiplexed async connection.
#[derive(Clone)]
pub struct RedisPublisher {
    conn: MultiplexedConnection,
    key_prefix: String,
    job: String,
}

impl RedisPublisher {
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!(url = %config.url, prefix = %config.key_prefix, "connected to redis");

        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
            job: config.job.clone(),
        })
    }

    pub fn latest_key(&self) -> String {
        format!("{}:latest", self.key_prefix)
    }

    pub fn channel(&self) -> String {
        format!("{}:samples", self.key_prefix)
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(&self, sample: &Sample) -> Result<()> {
        let mut conn = self.conn.clone();

        let fields = gauges(sample);
        conn.hset_multiple::<_, _, _, ()>(self.latest_key(), fields.as_slice())
            .await?;

        let payload = serde_json::to_string(&Envelope::new(self.job.clone(), sample.clone()))?;
        let receivers: i64 = conn.publish(self.channel(), payload).await?;
        debug!(receivers, gauges = fields.len(), "published sample");
        Ok(())
    }
}

/// Publish the last sample stored at `path`.
///
/// Returns the published sample, or `None` when the file holds no samples.
pub async fn publish_latest(path: &Path, publisher: &dyn Publisher) -> Result<Option<Sample>> {
    let samples = read_samples(path)?;
    let Some(latest) = samples.last() else {
        info!(path = %path.display(), "no samples to export");
        return Ok(None);
    };

    publisher.publish(latest).await?;
    Ok(Some(latest.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::MemoryReading;
    use crate::publishers::file::write_json_array;
    use crate::sample::AcceleratorReading;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        published: Mutex<Vec<Sample>>,
    }

    #[async_trait]
    impl Publisher for Recording {
        async fn publish(&self, sample: &Sample) -> Result<()> {
            self.published.lock().unwrap().push(sample.clone());
            Ok(())
        }
    }

    fn sample(cpu: f32) -> Sample {
        let mut sample = Sample::from_host(
            Utc::now(),
            cpu,
            MemoryReading {
                used_bytes: 1024 * 1024 * 1024,
                total_bytes: 4 * 1024 * 1024 * 1024,
            },
        );
        sample.accelerators.insert(
            1,
            AcceleratorReading {
                utilization_percent: 90.0,
                memory_used_gb: 3.5,
                ..Default::default()
            },
        );
        sample
    }

    #[test]
    fn gauges_cover_host_and_devices() {
        let fields = gauges(&sample(12.0));

        assert!(fields.contains(&("cpu_util".to_string(), 12.0)));
        assert!(fields.contains(&("cpu_mem_gb".to_string(), 1.0)));
        assert!(fields.contains(&("cpu_mem_percent".to_string(), 25.0)));
        assert!(fields.contains(&("gpu_util:1".to_string(), 90.0)));
        assert!(fields.contains(&("gpu_mem_gb:1".to_string(), 3.5)));
        assert_eq!(fields.len(), 5);
    }

    #[test]
    fn envelope_carries_unique_ids() {
        let a = Envelope::new("job", sample(1.0));
        let b = Envelope::new("job", sample(1.0));

        assert_ne!(a.id, b.id);
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["job"], "job");
        assert_eq!(json["sample"]["gpu_util"]["1"], 90.0);
    }

    #[tokio::test]
    async fn publish_latest_sends_last_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.json");
        write_json_array(&path, &[sample(1.0), sample(2.0), sample(3.0)]).unwrap();
        let publisher = Recording::default();

        let published = publish_latest(&path, &publisher).await.unwrap();

        assert_eq!(published.unwrap().cpu_util, 3.0);
        let recorded = publisher.published.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].cpu_util, 3.0);
    }

    #[tokio::test]
    async fn publish_latest_skips_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.jsonl");
        std::fs::write(&path, "").unwrap();
        let publisher = Recording::default();

        assert!(publish_latest(&path, &publisher).await.unwrap().is_none());
        assert!(publisher.published.lock().unwrap().is_empty());
    }
}
