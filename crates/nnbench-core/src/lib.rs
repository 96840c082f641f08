//! Core library for nnbench, a batch inference benchmark driver.
//!
//! This crate provides:
//! - Sample discovery for flat tensor-blob and per-class image datasets
//! - Input binding (direct byte copy or decode/resize/center-crop)
//! - The timed, strictly sequential inference loop
//! - Per-sample result files and the aggregate latency report

pub mod bench;
pub mod binder;
pub mod config;
pub mod dataset;
pub mod error;
pub mod model;
pub mod preprocess;
pub mod runner;
pub mod timing;
pub mod writer;

pub use bench::Benchmark;
pub use binder::{binder_for, BindError, DirectTensorBinder, ImageBinder, InputBinder};
pub use config::BenchConfig;
pub use dataset::{discover_samples, DatasetKind, Sample};
pub use error::{BenchError, Result, SampleStage};
pub use model::{load_model, resolve_model_path, Engine};
pub use preprocess::ImagePipeline;
pub use runner::{RunReport, Runner};
pub use timing::{LatencySummary, RunClock, TimingAggregator, TimingRecord};
pub use writer::ResultWriter;

/// Re-export inference types.
pub use nnbench_inference::{
    DeviceType, InferenceBackend, InferenceError, InputTensor, OutputTensor, PreparedInputs,
    TensorSpec, TensorType,
};
