//! File sinks and the matching reader.
//!
//! Two on-disk conventions exist: a single JSON array written when a sampler
//! stops, and one JSON object per line streamed while sampling. Readers accept
//! both.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::traits::SampleSink;
use crate::error::{Result, SamplerError};
use crate::sample::Sample;

/// Streams each sample as one JSON line, appending to the destination.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: File,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_parent(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SamplerError::io(&path, e))?;
        debug!(path = %path.display(), "streaming samples");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SampleSink for JsonLinesSink {
    fn append(&mut self, sample: &Sample) -> Result<()> {
        let mut line = serde_json::to_vec(sample)?;
        line.push(b'\n');
        // One write per record keeps lines whole if the process is killed.
        self.file
            .write_all(&line)
            .and_then(|()| self.file.flush())
            .map_err(|e| SamplerError::io(&self.path, e))
    }

    fn finish(&mut self) -> Result<()> {
        self.file
            .sync_data()
            .map_err(|e| SamplerError::io(&self.path, e))
    }
}

/// Write `samples` to `path` as a pretty-printed JSON array.
///
/// The array is written to a sibling temporary file first and renamed into
/// place, so readers never observe a half-written file.
pub fn write_json_array(path: &Path, samples: &[Sample]) -> Result<()> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);

    let file = File::create(&tmp).map_err(|e| SamplerError::io(&tmp, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, samples)?;
    writer
        .flush()
        .and_then(|()| writer.get_ref().sync_all())
        .map_err(|e| SamplerError::io(&tmp, e))?;
    drop(writer);

    fs::rename(&tmp, path).map_err(|e| SamplerError::io(path, e))?;
    debug!(path = %path.display(), samples = samples.len(), "flushed samples");
    Ok(())
}

/// Read samples stored in either on-disk convention.
pub fn read_samples(path: &Path) -> Result<Vec<Sample>> {
    let raw = fs::read_to_string(path).map_err(|e| SamplerError::io(path, e))?;
    parse_samples(&raw)
}

/// Parse a JSON array of samples or newline-delimited sample objects.
///
/// Malformed lines in the line-delimited form, such as a record cut short by
/// a killed writer, are skipped with a warning. The input is rejected only
/// when no line parses at all.
pub fn parse_samples(raw: &str) -> Result<Vec<Sample>> {
    let trimmed = raw.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    let mut first_error = None;
    for (index, line) in trimmed.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(sample) => samples.push(sample),
            Err(e) => {
                debug!(line = index + 1, error = %e, "skipping malformed sample line");
                skipped += 1;
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if samples.is_empty() => Err(e.into()),
        _ => {
            if skipped > 0 {
                warn!(skipped, kept = samples.len(), "skipped malformed sample lines");
            }
            Ok(samples)
        }
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| SamplerError::io(parent, e))
        }
        _ => Ok(()),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
