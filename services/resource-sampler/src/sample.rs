//! Telemetry sample model and its on-disk record format.
//!
//! All memory amounts are GiB (`bytes / 1024^3`), utilization is a percentage
//! and timestamps are UTC. The serialized form keeps the flat field names the
//! training tooling already consumes (`cpu_util`, `cpu_mem_gb`, `gpu_util`,
//! `gpu_mem`), with per-device maps keyed by device index.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collectors::{DeviceReading, MemoryReading};

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Convert a byte count to GiB.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GIB
}

/// One accelerator's reading inside a [`Sample`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AcceleratorReading {
    /// Compute utilization (0-100%)
    pub utilization_percent: f32,
    /// Used device memory in GiB
    pub memory_used_gb: f64,
    /// Total device memory in GiB, when the provider reports it
    pub memory_total_gb: Option<f64>,
    /// Core temperature in Celsius, when the provider reports it
    pub temperature_celsius: Option<f32>,
}

impl From<DeviceReading> for AcceleratorReading {
    fn from(reading: DeviceReading) -> Self {
        Self {
            utilization_percent: reading.utilization_percent,
            memory_used_gb: bytes_to_gb(reading.memory_used_bytes),
            memory_total_gb: reading.memory_total_bytes.map(bytes_to_gb),
            temperature_celsius: reading.temperature_celsius,
        }
    }
}

/// One telemetry observation.
///
/// `accelerators` is keyed by device index and only holds devices that
/// answered for this particular sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "SampleRecord", from = "SampleRecord")]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    /// Host CPU utilization (0-100%)
    pub cpu_util: f32,
    /// Host memory in use, GiB
    pub cpu_mem_gb: f64,
    /// Host memory in use, percent of total
    pub cpu_mem_percent: f32,
    pub accelerators: BTreeMap<u32, AcceleratorReading>,
}

impl Sample {
    /// Build a sample from raw host readings with no accelerator data.
    pub fn from_host(timestamp: DateTime<Utc>, cpu_util: f32, memory: MemoryReading) -> Self {
        Self {
            timestamp,
            cpu_util,
            cpu_mem_gb: memory.used_gb(),
            cpu_mem_percent: memory.percent(),
            accelerators: BTreeMap::new(),
        }
    }

    pub fn has_accelerators(&self) -> bool {
        !self.accelerators.is_empty()
    }
}

/// Flat serialized form of a [`Sample`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SampleRecord {
    timestamp: DateTime<Utc>,
    cpu_util: f32,
    cpu_mem_gb: f64,
    #[serde(default)]
    cpu_mem_percent: f32,
    #[serde(default)]
    gpu_util: BTreeMap<u32, f32>,
    #[serde(default)]
    gpu_mem: BTreeMap<u32, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    gpu_mem_total: BTreeMap<u32, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    gpu_temp: BTreeMap<u32, f32>,
}

impl From<Sample> for SampleRecord {
    fn from(sample: Sample) -> Self {
        let mut record = SampleRecord {
            timestamp: sample.timestamp,
            cpu_util: sample.cpu_util,
            cpu_mem_gb: sample.cpu_mem_gb,
            cpu_mem_percent: sample.cpu_mem_percent,
            gpu_util: BTreeMap::new(),
            gpu_mem: BTreeMap::new(),
            gpu_mem_total: BTreeMap::new(),
            gpu_temp: BTreeMap::new(),
        };
        for (index, reading) in sample.accelerators {
            record.gpu_util.insert(index, reading.utilization_percent);
            record.gpu_mem.insert(index, reading.memory_used_gb);
            if let Some(total) = reading.memory_total_gb {
                record.gpu_mem_total.insert(index, total);
            }
            if let Some(temp) = reading.temperature_celsius {
                record.gpu_temp.insert(index, temp);
            }
        }
        record
    }
}

impl From<SampleRecord> for Sample {
    fn from(record: SampleRecord) -> Self {
        let indices: std::collections::BTreeSet<u32> = record
            .gpu_util
            .keys()
            .chain(record.gpu_mem.keys())
            .copied()
            .collect();

        let accelerators = indices
            .into_iter()
            .map(|index| {
                let reading = AcceleratorReading {
                    utilization_percent: record.gpu_util.get(&index).copied().unwrap_or_default(),
                    memory_used_gb: record.gpu_mem.get(&index).copied().unwrap_or_default(),
                    memory_total_gb: record.gpu_mem_total.get(&index).copied(),
                    temperature_celsius: record.gpu_temp.get(&index).copied(),
                };
                (index, reading)
            })
            .collect();

        Sample {
            timestamp: record.timestamp,
            cpu_util: record.cpu_util,
            cpu_mem_gb: record.cpu_mem_gb,
            cpu_mem_percent: record.cpu_mem_percent,
            accelerators,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_with_gpu() -> Sample {
        let mut accelerators = BTreeMap::new();
        accelerators.insert(
            0,
            AcceleratorReading {
                utilization_percent: 87.0,
                memory_used_gb: 12.5,
                memory_total_gb: Some(24.0),
                temperature_celsius: Some(66.0),
            },
        );
        accelerators.insert(
            3,
            AcceleratorReading {
                utilization_percent: 10.0,
                memory_used_gb: 0.5,
                memory_total_gb: None,
                temperature_celsius: None,
            },
        );
        Sample {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            cpu_util: 42.5,
            cpu_mem_gb: 7.25,
            cpu_mem_percent: 45.0,
            accelerators,
        }
    }

    #[test]
    fn serializes_to_flat_canonical_fields() {
        let value = serde_json::to_value(sample_with_gpu()).unwrap();

        assert_eq!(value["cpu_util"], 42.5);
        assert_eq!(value["cpu_mem_gb"], 7.25);
        assert_eq!(value["gpu_util"]["0"], 87.0);
        assert_eq!(value["gpu_util"]["3"], 10.0);
        assert_eq!(value["gpu_mem"]["0"], 12.5);
        assert_eq!(value["gpu_mem_total"]["0"], 24.0);
        assert!(value["gpu_mem_total"].get("3").is_none());
        assert_eq!(value["timestamp"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn omits_optional_maps_without_accelerators() {
        let mut sample = sample_with_gpu();
        sample.accelerators.clear();
        let value = serde_json::to_value(sample).unwrap();

        assert!(value.get("gpu_temp").is_none());
        assert!(value.get("gpu_mem_total").is_none());
        assert_eq!(value["gpu_util"], serde_json::json!({}));
    }

    #[test]
    fn reads_records_written_without_percent_field() {
        let raw = r#"{"timestamp":"2024-05-01T12:00:00Z","cpu_util":12.0,"cpu_mem_gb":3.0,
            "gpu_util":{"1":50.0},"gpu_mem":{"1":2.0}}"#;
        let sample: Sample = serde_json::from_str(raw).unwrap();

        assert_eq!(sample.cpu_mem_percent, 0.0);
        assert_eq!(sample.accelerators.len(), 1);
        let reading = sample.accelerators[&1];
        assert_eq!(reading.utilization_percent, 50.0);
        assert_eq!(reading.memory_used_gb, 2.0);
        assert_eq!(reading.memory_total_gb, None);
    }

    #[test]
    fn device_reading_converts_bytes_to_gib() {
        let reading = AcceleratorReading::from(DeviceReading {
            utilization_percent: 30.0,
            memory_used_bytes: 2 * 1024 * 1024 * 1024,
            memory_total_bytes: Some(8 * 1024 * 1024 * 1024),
            temperature_celsius: None,
        });

        assert_eq!(reading.memory_used_gb, 2.0);
        assert_eq!(reading.memory_total_gb, Some(8.0));
    }
}
