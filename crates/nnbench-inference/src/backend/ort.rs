//! ONNX Runtime (ort) backend for native platforms.

use std::path::Path;
use std::sync::Mutex;

#[cfg(feature = "cuda")]
use ort::ep::CUDA;
use ort::ep::XNNPACK;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionInputValue};
use ort::tensor::TensorElementType;
use ort::value::{Tensor, ValueType};
use tracing::debug;

use crate::backend::{DeviceType, PreparedInputs};
use crate::error::InferenceError;
use crate::tensor::{InputTensor, OutputTensor, TensorSpec, TensorType};
use crate::{InferenceBackend, Result};

/// Session options for [`OrtBackend`].
#[derive(Debug, Clone)]
pub struct OrtOptions {
    pub device_type: DeviceType,
    pub device_id: u32,
    pub intra_threads: usize,
}

impl Default for OrtOptions {
    fn default() -> Self {
        Self {
            device_type: DeviceType::Cpu,
            device_id: 0,
            intra_threads: 4,
        }
    }
}

/// Backend using ONNX Runtime for native inference.
pub struct OrtBackend {
    session: Mutex<Session>,
    input_specs: Vec<TensorSpec>,
    output_names: Vec<String>,
}

impl OrtBackend {
    /// Load a model from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P, options: &OrtOptions) -> Result<Self> {
        let path = path.as_ref();
        debug!(
            "Loading ONNX model from: {} ({} {})",
            path.display(),
            options.device_type,
            options.device_id
        );

        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes, options)
    }

    /// Load a model from bytes.
    pub fn from_bytes(bytes: &[u8], options: &OrtOptions) -> Result<Self> {
        debug!("Loading ONNX model from {} bytes", bytes.len());

        let session = Self::builder(options)?
            .commit_from_memory(bytes)
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))?;

        Self::from_session(session)
    }

    fn builder(options: &OrtOptions) -> Result<SessionBuilder> {
        let builder = Session::builder()
            .map_err(|e| InferenceError::SessionCreate(e.to_string()))?;

        let builder = match options.device_type {
            DeviceType::Cpu => builder
                .with_execution_providers([XNNPACK::default().build()])
                .map_err(|e| InferenceError::SessionCreate(e.to_string()))?,
            #[cfg(feature = "cuda")]
            DeviceType::Gpu => builder
                .with_execution_providers([CUDA::default()
                    .with_device_id(options.device_id as i32)
                    .build()
                    .error_on_failure()])
                .map_err(|e| InferenceError::SessionCreate(e.to_string()))?,
            #[cfg(not(feature = "cuda"))]
            DeviceType::Gpu => {
                return Err(InferenceError::SessionCreate(
                    "GPU device requested but nnbench was built without the `cuda` feature"
                        .to_string(),
                ));
            }
        };

        builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| InferenceError::SessionCreate(e.to_string()))?
            .with_intra_threads(options.intra_threads)
            .map_err(|e| InferenceError::SessionCreate(e.to_string()))
    }

    fn from_session(session: Session) -> Result<Self> {
        let input_specs = session
            .inputs()
            .iter()
            .map(|i| spec_from_value_type(i.name(), i.dtype()))
            .collect::<Result<Vec<_>>>()?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        debug!("Model inputs: {:?}", input_specs);
        debug!("Model outputs: {:?}", output_names);

        Ok(Self {
            session: Mutex::new(session),
            input_specs,
            output_names,
        })
    }

    fn convert_input(&self, tensor: &InputTensor) -> Result<SessionInputValue<'static>> {
        let shape: Vec<i64> = tensor.shape().iter().map(|&s| s as i64).collect();
        macro_rules! to_value {
            ($ty:ty) => {
                Tensor::from_array((shape, tensor.to_vec::<$ty>()?))
                    .map(Into::into)
                    .map_err(|e| InferenceError::InvalidInput(e.to_string()))
            };
        }
        match tensor.dtype() {
            TensorType::Uint8 => to_value!(u8),
            TensorType::Int32 => to_value!(i32),
            TensorType::Int64 => to_value!(i64),
            TensorType::Float32 => to_value!(f32),
            TensorType::Float64 => to_value!(f64),
        }
    }
}

fn spec_from_value_type(name: &str, value_type: &ValueType) -> Result<TensorSpec> {
    match value_type {
        ValueType::Tensor { ty, shape, .. } => {
            let dtype = match ty {
                TensorElementType::Uint8 => TensorType::Uint8,
                TensorElementType::Int32 => TensorType::Int32,
                TensorElementType::Int64 => TensorType::Int64,
                TensorElementType::Float32 => TensorType::Float32,
                TensorElementType::Float64 => TensorType::Float64,
                other => {
                    return Err(InferenceError::ModelLoad(format!(
                        "input '{}' has unsupported element type {:?}",
                        name, other
                    )));
                }
            };
            Ok(TensorSpec::from_dims(name, dtype, shape))
        }
        other => Err(InferenceError::ModelLoad(format!(
            "input '{}' is not a tensor: {:?}",
            name, other
        ))),
    }
}

type OrtInputs = Vec<(String, SessionInputValue<'static>)>;

impl InferenceBackend for OrtBackend {
    fn run(&self, inputs: &[InputTensor]) -> Result<Vec<OutputTensor>> {
        self.run_prepared(self.prepare(inputs)?)
    }

    fn prepare(&self, inputs: &[InputTensor]) -> Result<PreparedInputs> {
        let ort_inputs: OrtInputs = inputs
            .iter()
            .map(|tensor| {
                let value = self.convert_input(tensor)?;
                Ok((tensor.name().to_string(), value))
            })
            .collect::<Result<_>>()?;
        Ok(PreparedInputs::new(ort_inputs))
    }

    fn run_prepared(&self, inputs: PreparedInputs) -> Result<Vec<OutputTensor>> {
        let ort_inputs: OrtInputs = inputs.downcast()?;

        let mut session = self.session.lock()
            .map_err(|e| InferenceError::InferenceFailed(format!("Failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort_inputs)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let mut results = Vec::with_capacity(outputs.len());

        for (name, value) in outputs.iter() {
            macro_rules! try_extract {
                ($ty:ty) => {
                    value.try_extract_tensor::<$ty>().ok().map(|(shape_ref, data)| {
                        let shape: Vec<usize> = shape_ref.iter().map(|&s| s as usize).collect();
                        OutputTensor::from_elements(name, shape, data)
                    })
                };
            }

            let tensor = try_extract!(f32)
                .or_else(|| try_extract!(i64))
                .or_else(|| try_extract!(i32))
                .or_else(|| try_extract!(f64))
                .or_else(|| try_extract!(u8))
                .unwrap_or_else(|| {
                    Err(InferenceError::OutputExtraction(format!(
                        "unsupported output type for '{}'",
                        name
                    )))
                })?;

            results.push(tensor);
        }

        Ok(results)
    }

    fn input_specs(&self) -> &[TensorSpec] {
        &self.input_specs
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }
}
