//! Persisting periodic measurement records.

use crate::metrics::heart_rate::HeartRateEstimate;
use crate::metrics::hrv::HrvEstimate;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseRecord {
    pub subject_id: String,
    pub heart_rate: HeartRateEstimate,
    pub hrv: HrvEstimate,
    pub raw_samples: Vec<f64>,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

pub trait RecordStore {
    fn save(&mut self, record: &PulseRecord) -> Result<()>;
}

/// Keeps records in memory; handy for tests and short sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub records: Vec<PulseRecord>,
}

impl RecordStore for MemoryStore {
    fn save(&mut self, record: &PulseRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Appends one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    file: File,
}

impl JsonLinesStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for JsonLinesStore {
    fn save(&mut self, record: &PulseRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        writeln!(self.file, "{line}")
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        log::debug!(
            "saved record for {} ({} bpm) to {}",
            record.subject_id,
            record.heart_rate.bpm,
            self.path.display()
        );
        Ok(())
    }
}

/// Load every record from a JSON-lines file.
pub fn read_records(path: &Path) -> Result<Vec<PulseRecord>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut out = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("{}:{} is not a record", path.display(), idx + 1))?;
        out.push(record);
    }
    Ok(out)
}

/// Fires once every `interval_s` seconds of clock time.
#[derive(Debug, Clone, Copy)]
pub struct RecordSchedule {
    interval_s: f64,
    last: Option<f64>,
}

impl RecordSchedule {
    pub fn every(interval_s: f64) -> Result<Self> {
        if !(interval_s.is_finite() && interval_s > 0.0) {
            bail!("record interval must be a positive number of seconds, got {interval_s}");
        }
        Ok(Self {
            interval_s,
            last: None,
        })
    }

    /// The first call only starts the period.
    pub fn due(&mut self, now: f64) -> bool {
        match self.last {
            None => {
                self.last = Some(now);
                false
            }
            Some(last) if now - last >= self.interval_s => {
                self.last = Some(now);
                true
            }
            Some(_) => false,
        }
    }
}
