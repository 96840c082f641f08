//! Error types for the nnbench-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for a benchmark run.
///
/// Every variant aborts the whole run; nothing is retried and no partial
/// summary is written once one of these surfaces.
#[derive(Error, Debug)]
pub enum BenchError {
    /// The model path does not resolve to a readable file.
    #[error("invalid model path: {}", .0.display())]
    InvalidModelPath(PathBuf),

    /// The runtime refused the model.
    #[error("failed to load model: {0}")]
    ModelLoadFailure(String),

    /// No samples were found under the input directory.
    #[error("no input data under {}", .0.display())]
    EmptyInputSet(PathBuf),

    /// Sample discovery itself failed (bad pattern, unreadable directory).
    #[error("failed to list samples: {0}")]
    Discovery(String),

    /// A sample file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The sample buffer is smaller than the model input.
    #[error("input data sizes do not match for {}: model expects {expected} bytes, sample has {actual}", path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    /// The sample is not a decodable image.
    #[error("failed to decode image {}: {source}", path.display())]
    DecodeFailure {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The forward pass failed.
    #[error("predict {} failed: {source}", path.display())]
    PredictFailure {
        path: PathBuf,
        #[source]
        source: nnbench_inference::InferenceError,
    },

    /// A result or report file could not be written.
    #[error("write result failed for {}: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Aggregation was requested over zero timing records.
    #[error("no inference timings were recorded")]
    NoSamples,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Per-sample lifecycle stage a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStage {
    Bound,
    Predicted,
    Written,
}

impl BenchError {
    /// Stage of the per-sample state machine that failed, if the error
    /// came out of the inference loop.
    pub fn stage(&self) -> Option<SampleStage> {
        match self {
            BenchError::ReadFailure { .. }
            | BenchError::SizeMismatch { .. }
            | BenchError::DecodeFailure { .. } => Some(SampleStage::Bound),
            BenchError::PredictFailure { .. } => Some(SampleStage::Predicted),
            BenchError::WriteFailure { .. } => Some(SampleStage::Written),
            _ => None,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            BenchError::WriteFailure { .. } => 2,
            _ => 1,
        }
    }
}

/// Result type for the nnbench-core library.
pub type Result<T> = std::result::Result<T, BenchError>;
