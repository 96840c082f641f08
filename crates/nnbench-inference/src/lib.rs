//! Model execution layer for nnbench.
//!
//! This crate provides a unified interface for running compiled models
//! across different backends:
//! - `ort` with XNNPACK (CPU) or CUDA (GPU) execution providers
//! - `tract` as a pure-Rust CPU fallback
//!
//! Tensors cross the backend boundary as raw little-endian byte buffers
//! described by a [`TensorSpec`], so callers can bind externally produced
//! buffers without knowing the element type at compile time.

mod backend;
mod error;
mod tensor;

pub use backend::{DeviceType, InferenceBackend, PreparedInputs};
pub use error::InferenceError;
pub use tensor::{Element, InputTensor, OutputTensor, TensorSpec, TensorType};

#[cfg(feature = "native")]
pub use backend::ort::{OrtBackend, OrtOptions};

#[cfg(feature = "tract")]
pub use backend::tract::TractBackend;

/// Result type for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;
