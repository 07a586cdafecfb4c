//! In-memory sample store read by `latest` and `snapshot`.

use std::sync::{Arc, PoisonError, RwLock};

use super::traits::SampleSink;
use crate::error::Result;
use crate::sample::Sample;

/// Append-only, shared in-memory sample sequence.
///
/// Clones share the same storage. A sample becomes visible to readers only
/// once it is fully pushed.
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    samples: Arc<RwLock<Vec<Sample>>>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, sample: Sample) {
        self.samples
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sample);
    }

    /// Most recent sample, if any.
    pub fn latest(&self) -> Option<Sample> {
        self.samples
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Copy of every sample recorded so far.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.samples.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SampleSink for SampleBuffer {
    fn append(&mut self, sample: &Sample) -> Result<()> {
        self.push(sample.clone());
        Ok(())
    }
}
