//! Inference backend implementations.

#[cfg(feature = "native")]
pub mod ort;

#[cfg(feature = "tract")]
pub mod tract;

use std::any::Any;
use std::fmt;
use std::str::FromStr;

use crate::{InferenceError, InputTensor, OutputTensor, TensorSpec, Result};

/// Device family a model is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceType {
    #[default]
    Cpu,
    Gpu,
}

impl FromStr for DeviceType {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(DeviceType::Cpu),
            "gpu" | "cuda" => Ok(DeviceType::Gpu),
            other => Err(InferenceError::SessionCreate(format!(
                "unknown device type '{}' (expected CPU or GPU)",
                other
            ))),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Cpu => f.write_str("CPU"),
            DeviceType::Gpu => f.write_str("GPU"),
        }
    }
}

/// Inputs already converted into a backend's native representation.
///
/// Produced by [`InferenceBackend::prepare`] and consumed by
/// [`InferenceBackend::run_prepared`] on the same backend.
pub struct PreparedInputs(Box<dyn Any>);

impl PreparedInputs {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// Recover the native inputs, failing if another backend prepared them.
    pub fn downcast<T: Any>(self) -> Result<T> {
        self.0.downcast::<T>().map(|b| *b).map_err(|_| {
            InferenceError::InvalidInput("inputs were prepared by a different backend".to_string())
        })
    }
}

impl fmt::Debug for PreparedInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PreparedInputs")
    }
}

/// Trait for model execution backends.
///
/// A backend owns a loaded model for its whole lifetime; dropping it
/// releases the underlying runtime session.
pub trait InferenceBackend: Send + Sync {
    /// Run one forward pass.
    ///
    /// # Arguments
    /// * `inputs` - One tensor per declared model input, in declaration order
    ///
    /// # Returns
    /// Output tensors in the order the model declares them
    fn run(&self, inputs: &[InputTensor]) -> Result<Vec<OutputTensor>>;

    /// Convert inputs ahead of a forward pass, outside any timed region.
    ///
    /// The default keeps a copy of the tensors for [`InferenceBackend::run`].
    fn prepare(&self, inputs: &[InputTensor]) -> Result<PreparedInputs> {
        Ok(PreparedInputs::new(inputs.to_vec()))
    }

    /// Run one forward pass on inputs from [`InferenceBackend::prepare`].
    fn run_prepared(&self, inputs: PreparedInputs) -> Result<Vec<OutputTensor>> {
        let inputs: Vec<InputTensor> = inputs.downcast()?;
        self.run(&inputs)
    }

    /// Get the input signature declared by the model.
    fn input_specs(&self) -> &[TensorSpec];

    /// Get the output names produced by the model.
    fn output_names(&self) -> &[String];
}
