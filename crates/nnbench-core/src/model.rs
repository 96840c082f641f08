//! Model loading.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use nnbench_inference::{DeviceType, InferenceBackend};

use crate::config::ModelConfig;
use crate::error::{BenchError, Result};

/// Execution engine used to run the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// ONNX Runtime.
    #[default]
    Ort,
    /// Tract (pure Rust, CPU only).
    Tract,
}

impl FromStr for Engine {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ort" | "onnxruntime" => Ok(Engine::Ort),
            "tract" => Ok(Engine::Tract),
            other => Err(BenchError::Config(format!("unknown engine '{}'", other))),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Ort => f.write_str("ort"),
            Engine::Tract => f.write_str("tract"),
        }
    }
}

/// Resolve the model path to an existing regular file.
pub fn resolve_model_path(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(BenchError::InvalidModelPath(path.to_path_buf()));
    }
    match path.canonicalize() {
        Ok(real) if real.is_file() => Ok(real),
        _ => Err(BenchError::InvalidModelPath(path.to_path_buf())),
    }
}

/// Load the model described by `config`.
///
/// The returned box owns the runtime session; dropping it releases the
/// model on every exit path.
pub fn load_model(config: &ModelConfig) -> Result<Box<dyn InferenceBackend>> {
    let path = resolve_model_path(&config.path)?;

    let load_failure = |reason: String| {
        BenchError::ModelLoadFailure(format!(
            "{}, device id: {}, device type: {}: {}",
            path.display(),
            config.device_id,
            config.device_type,
            reason
        ))
    };

    let device: DeviceType = config
        .device_type
        .parse()
        .map_err(|e: nnbench_inference::InferenceError| load_failure(e.to_string()))?;

    let backend: Box<dyn InferenceBackend> = match config.engine {
        Engine::Ort => load_ort(&path, device, config).map_err(load_failure)?,
        Engine::Tract => load_tract(&path, device, config).map_err(load_failure)?,
    };

    if backend.input_specs().is_empty() {
        return Err(load_failure("model declares no inputs".to_string()));
    }

    info!(
        "Loaded {} with {} on {} {}: inputs {:?}, outputs {:?}",
        path.display(),
        config.engine,
        device,
        config.device_id,
        backend.input_specs(),
        backend.output_names()
    );

    Ok(backend)
}

#[cfg(feature = "native")]
fn load_ort(
    path: &Path,
    device: DeviceType,
    config: &ModelConfig,
) -> std::result::Result<Box<dyn InferenceBackend>, String> {
    use nnbench_inference::{OrtBackend, OrtOptions};

    let options = OrtOptions {
        device_type: device,
        device_id: config.device_id,
        intra_threads: config.intra_threads,
    };
    let backend = OrtBackend::from_file(path, &options).map_err(|e| e.to_string())?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "native"))]
fn load_ort(
    _path: &Path,
    _device: DeviceType,
    _config: &ModelConfig,
) -> std::result::Result<Box<dyn InferenceBackend>, String> {
    Err("nnbench was built without the `native` feature".to_string())
}

#[cfg(feature = "tract")]
fn load_tract(
    path: &Path,
    device: DeviceType,
    config: &ModelConfig,
) -> std::result::Result<Box<dyn InferenceBackend>, String> {
    use nnbench_inference::{TensorSpec, TensorType, TractBackend};

    if device != DeviceType::Cpu {
        return Err("the tract engine only runs on CPU".to_string());
    }
    let shape = config
        .input_shape
        .clone()
        .ok_or_else(|| "the tract engine needs model.input_shape".to_string())?;
    let dtype = match &config.input_dtype {
        Some(name) => name.parse::<TensorType>().map_err(|e| e.to_string())?,
        None => TensorType::Float32,
    };

    let backend = TractBackend::from_file(path, TensorSpec::new("input", dtype, shape))
        .map_err(|e| e.to_string())?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "tract"))]
fn load_tract(
    _path: &Path,
    _device: DeviceType,
    _config: &ModelConfig,
) -> std::result::Result<Box<dyn InferenceBackend>, String> {
    Err("nnbench was built without the `tract` feature".to_string())
}
