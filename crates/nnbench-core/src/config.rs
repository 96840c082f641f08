//! Configuration structures for a benchmark run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetKind;
use crate::error::{BenchError, Result};
use crate::model::Engine;

/// Main configuration for nnbench.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Model configuration.
    pub model: ModelConfig,

    /// Input dataset configuration.
    pub dataset: DatasetConfig,

    /// Output locations.
    pub output: OutputConfig,

    /// Loop behaviour.
    pub run: RunConfig,
}

/// Model file and placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the compiled model.
    pub path: PathBuf,

    /// Device family ("CPU" or "GPU").
    pub device_type: String,

    /// Accelerator ordinal.
    pub device_id: u32,

    /// Number of intra-op CPU threads.
    pub intra_threads: usize,

    /// Execution engine.
    pub engine: Engine,

    /// Concrete input shape; required by the tract engine.
    pub input_shape: Option<Vec<usize>>,

    /// Input element type for the tract engine (defaults to float32).
    pub input_dtype: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            device_type: "CPU".to_string(),
            device_id: 0,
            intra_threads: 4,
            engine: Engine::default(),
            input_shape: None,
            input_dtype: None,
        }
    }
}

/// Where samples come from and how they are bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Dataset kind.
    pub kind: DatasetKind,

    /// Root directory of the samples.
    pub input_dir: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            kind: DatasetKind::DirectTensor,
            input_dir: PathBuf::from("."),
        }
    }
}

/// Output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving one file per (sample, output index).
    pub results_dir: PathBuf,

    /// One-line latency summary.
    pub summary_path: PathBuf,

    /// Optional per-sample latency CSV.
    pub latency_csv: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("./result_Files"),
            summary_path: PathBuf::from("./time_Result/test_perform_static.txt"),
            latency_csv: None,
        }
    }
}

/// Loop behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Untimed forward passes on the first sample before measuring.
    pub warmup: usize,
}

impl BenchConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BenchError::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| BenchError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| BenchError::Config(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| BenchError::Config(format!("{}: {}", path.display(), e)))
    }
}
