//! Latency measurement and the aggregate report.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::debug;

use crate::error::{BenchError, Result};

/// Monotonic millisecond clock anchored at the start of a run.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    epoch: Instant,
}

impl RunClock {
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Milliseconds since the epoch, with sub-millisecond precision.
    pub fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }
}

/// Start/end timestamps bracketing one forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingRecord {
    pub sample: PathBuf,
    pub start_ms: f64,
    pub end_ms: f64,
}

impl TimingRecord {
    pub fn elapsed_ms(&self) -> f64 {
        self.end_ms - self.start_ms
    }
}

/// Mean latency over a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub average_ms: f64,
    pub count: usize,
}

impl LatencySummary {
    /// The one-line human readable report.
    pub fn report_line(&self) -> String {
        format!(
            "NN inference cost average time: {} ms of infer_count {}",
            self.average_ms, self.count
        )
    }

    /// Write the report line to `path`, truncating it and creating the
    /// parent directory when needed.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let write_failure = |source| BenchError::WriteFailure {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_failure)?;
        }
        fs::write(path, format!("{}\n", self.report_line())).map_err(write_failure)?;
        debug!("Wrote latency summary to {}", path.display());
        Ok(())
    }
}

/// Append-only collection of timing records.
///
/// Records are never keyed by timestamp: two passes starting in the same
/// millisecond are both kept.
#[derive(Debug, Clone, Default)]
pub struct TimingAggregator {
    records: Vec<TimingRecord>,
}

impl TimingAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one record. `end_ms` is clamped to `start_ms` so every stored
    /// record satisfies `end >= start`.
    pub fn record(&mut self, sample: impl Into<PathBuf>, start_ms: f64, end_ms: f64) {
        self.records.push(TimingRecord {
            sample: sample.into(),
            start_ms,
            end_ms: end_ms.max(start_ms),
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ordered by start time; ties keep insertion order.
    pub fn records(&self) -> Vec<&TimingRecord> {
        let mut ordered: Vec<&TimingRecord> = self.records.iter().collect();
        ordered.sort_by(|a, b| a.start_ms.total_cmp(&b.start_ms));
        ordered
    }

    /// Arithmetic mean of `end - start` over all records.
    pub fn summarize(&self) -> Result<LatencySummary> {
        if self.is_empty() {
            return Err(BenchError::NoSamples);
        }
        let total: f64 = self.records.iter().map(TimingRecord::elapsed_ms).sum();
        let count = self.len();
        Ok(LatencySummary {
            average_ms: total / count as f64,
            count,
        })
    }

    /// Write one CSV row per record.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let write_failure = |e: csv::Error| BenchError::WriteFailure {
            path: path.to_path_buf(),
            source: e.into(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| BenchError::WriteFailure {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let mut wtr = csv::Writer::from_path(path).map_err(write_failure)?;
        wtr.write_record(["sample", "start_ms", "end_ms", "elapsed_ms"])
            .map_err(write_failure)?;

        for record in self.records() {
            wtr.write_record([
                record.sample.display().to_string(),
                format!("{:.3}", record.start_ms),
                format!("{:.3}", record.end_ms),
                format!("{:.3}", record.elapsed_ms()),
            ])
            .map_err(write_failure)?;
        }

        wtr.flush().map_err(|source| BenchError::WriteFailure {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}
