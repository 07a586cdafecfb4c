//! Core sink and publisher trait definitions.

use async_trait::async_trait;

use crate::error::{Result, SamplerError};
use crate::sample::Sample;

/// Destination fed by the capture loop, one sample at a time.
///
/// Appends happen from the sampling thread only. `finish` is called once
/// after the last append.
pub trait SampleSink: Send {
    fn append(&mut self, sample: &Sample) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Forwards to every sink, reporting the first error after trying them all.
impl SampleSink for Vec<Box<dyn SampleSink>> {
    fn append(&mut self, sample: &Sample) -> Result<()> {
        first_error(self.iter_mut().map(|sink| sink.append(sample)))
    }

    fn finish(&mut self) -> Result<()> {
        first_error(self.iter_mut().map(|sink| sink.finish()))
    }
}

fn first_error(results: impl Iterator<Item = Result<()>>) -> Result<()> {
    let mut first: Option<SamplerError> = None;
    for result in results {
        if let Err(e) = result {
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}

/// Remote destination for exported samples.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, sample: &Sample) -> Result<()>;
}
