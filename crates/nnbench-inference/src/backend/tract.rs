//! Tract backend for pure-Rust CPU inference.

use std::path::Path;

use tract_onnx::prelude::*;
use tracing::debug;

use crate::backend::PreparedInputs;
use crate::error::InferenceError;
use crate::tensor::{InputTensor, OutputTensor, TensorSpec, TensorType};
use crate::{InferenceBackend, Result};

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Backend using Tract for CPU inference.
pub struct TractBackend {
    model: RunnableModel,
    input_specs: Vec<TensorSpec>,
    output_names: Vec<String>,
}

fn datum_type(dtype: TensorType) -> DatumType {
    match dtype {
        TensorType::Uint8 => DatumType::U8,
        TensorType::Int32 => DatumType::I32,
        TensorType::Int64 => DatumType::I64,
        TensorType::Float32 => DatumType::F32,
        TensorType::Float64 => DatumType::F64,
    }
}

impl TractBackend {
    /// Load a model from a file path, pinning its first input to `input`.
    ///
    /// ONNX graphs frequently carry symbolic batch dimensions, so the
    /// concrete input signature has to come from the caller.
    pub fn from_file<P: AsRef<Path>>(path: P, input: TensorSpec) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading ONNX model with Tract from: {}", path.display());

        // Load as inference model first
        let mut model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| InferenceError::ModelLoad(format!("Failed to load model: {}", e)))?;

        model
            .set_input_fact(0, InferenceFact::dt_shape(datum_type(input.dtype), input.shape.as_slice()))
            .map_err(|e| InferenceError::ModelLoad(format!("Failed to set input shape: {}", e)))?;

        let model = model
            .into_typed()
            .map_err(|e| InferenceError::ModelLoad(format!("Failed to type model: {}", e)))?
            .into_optimized()
            .map_err(|e| InferenceError::ModelLoad(format!("Failed to optimize: {}", e)))?
            .into_runnable()
            .map_err(|e| InferenceError::SessionCreate(e.to_string()))?;

        let output_names = (0..model.model().outputs.len())
            .map(|idx| format!("output_{}", idx))
            .collect();

        Ok(Self {
            model,
            input_specs: vec![input],
            output_names,
        })
    }

    fn convert_input(&self, tensor: &InputTensor) -> Result<TValue> {
        let shape = tensor.shape().to_vec();
        macro_rules! to_tvalue {
            ($ty:ty) => {
                tract_ndarray::ArrayD::from_shape_vec(
                    tract_ndarray::IxDyn(&shape),
                    tensor.to_vec::<$ty>()?,
                )
                .map(|arr| arr.into_tvalue())
                .map_err(|e| InferenceError::InvalidInput(e.to_string()))
            };
        }
        match tensor.dtype() {
            TensorType::Uint8 => to_tvalue!(u8),
            TensorType::Int32 => to_tvalue!(i32),
            TensorType::Int64 => to_tvalue!(i64),
            TensorType::Float32 => to_tvalue!(f32),
            TensorType::Float64 => to_tvalue!(f64),
        }
    }
}

impl InferenceBackend for TractBackend {
    fn run(&self, inputs: &[InputTensor]) -> Result<Vec<OutputTensor>> {
        self.run_prepared(self.prepare(inputs)?)
    }

    fn prepare(&self, inputs: &[InputTensor]) -> Result<PreparedInputs> {
        let tract_inputs: TVec<TValue> = inputs
            .iter()
            .map(|tensor| self.convert_input(tensor))
            .collect::<Result<TVec<_>>>()?;
        Ok(PreparedInputs::new(tract_inputs))
    }

    fn run_prepared(&self, inputs: PreparedInputs) -> Result<Vec<OutputTensor>> {
        let tract_inputs: TVec<TValue> = inputs.downcast()?;

        let outputs = self
            .model
            .run(tract_inputs)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let mut results = Vec::with_capacity(outputs.len());

        for (idx, output) in outputs.iter().enumerate() {
            let name = self.output_names.get(idx)
                .cloned()
                .unwrap_or_else(|| format!("output_{}", idx));

            macro_rules! try_view {
                ($ty:ty) => {
                    output.to_array_view::<$ty>().ok().map(|arr| {
                        let data: Vec<$ty> = arr.iter().cloned().collect();
                        OutputTensor::from_elements(name.clone(), arr.shape().to_vec(), &data)
                    })
                };
            }

            let tensor = try_view!(f32)
                .or_else(|| try_view!(i64))
                .or_else(|| try_view!(i32))
                .or_else(|| try_view!(f64))
                .or_else(|| try_view!(u8))
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
