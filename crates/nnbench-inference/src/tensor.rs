//! Tensor types for inference input/output.

use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayD, IxDyn};

use crate::error::InferenceError;
use crate::Result;

/// Supported tensor data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorType {
    Uint8,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl TensorType {
    /// Size of a single element in bytes.
    pub fn size(self) -> usize {
        match self {
            TensorType::Uint8 => 1,
            TensorType::Int32 | TensorType::Float32 => 4,
            TensorType::Int64 | TensorType::Float64 => 8,
        }
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TensorType::Uint8 => "uint8",
            TensorType::Int32 => "int32",
            TensorType::Int64 => "int64",
            TensorType::Float32 => "float32",
            TensorType::Float64 => "float64",
        };
        f.write_str(name)
    }
}

impl FromStr for TensorType {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "uint8" | "u8" => Ok(TensorType::Uint8),
            "int32" | "i32" => Ok(TensorType::Int32),
            "int64" | "i64" => Ok(TensorType::Int64),
            "float32" | "f32" | "float" => Ok(TensorType::Float32),
            "float64" | "f64" | "double" => Ok(TensorType::Float64),
            other => Err(InferenceError::InvalidInput(format!(
                "unknown tensor type '{}'",
                other
            ))),
        }
    }
}

/// Element types that can be stored in a tensor buffer.
///
/// Buffers are always little-endian so result files are portable between
/// hosts.
pub trait Element: Copy + Send + Sync + 'static {
    const DTYPE: TensorType;

    /// Decode one element from exactly `DTYPE.size()` bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// Append the little-endian encoding of `self` to `out`.
    fn write_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_element {
    ($ty:ty, $dtype:expr) => {
        impl Element for $ty {
            const DTYPE: TensorType = $dtype;

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(bytes);
                <$ty>::from_le_bytes(buf)
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_element!(u8, TensorType::Uint8);
impl_element!(i32, TensorType::Int32);
impl_element!(i64, TensorType::Int64);
impl_element!(f32, TensorType::Float32);
impl_element!(f64, TensorType::Float64);

fn decode_elements<T: Element>(data: &[u8]) -> Vec<T> {
    data.chunks_exact(T::DTYPE.size()).map(T::read_le).collect()
}

fn encode_elements<T: Element>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::DTYPE.size());
    for &v in values {
        v.write_le(&mut out);
    }
    out
}

/// Declared name, type and shape of a model input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
    pub name: String,
    pub dtype: TensorType,
    pub shape: Vec<usize>,
    /// Axes the model left symbolic; their `shape` entry is a placeholder.
    pub dynamic_axes: Vec<usize>,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, dtype: TensorType, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape,
            dynamic_axes: Vec::new(),
        }
    }

    /// Build a spec from runtime-reported dimensions.
    ///
    /// Dynamic dimensions (negative values) are pinned to 1, which is the
    /// single-sample batch this tool always runs with, and remembered in
    /// `dynamic_axes` so callers that know a better size can fill them in.
    pub fn from_dims(name: impl Into<String>, dtype: TensorType, dims: &[i64]) -> Self {
        let shape = dims
            .iter()
            .map(|&d| if d < 0 { 1 } else { d as usize })
            .collect();
        let dynamic_axes = dims
            .iter()
            .enumerate()
            .filter(|(_, d)| **d < 0)
            .map(|(axis, _)| axis)
            .collect();
        Self {
            dynamic_axes,
            ..Self::new(name, dtype, shape)
        }
    }

    pub fn is_dynamic(&self, axis: usize) -> bool {
        self.dynamic_axes.contains(&axis)
    }

    /// Number of elements.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Number of bytes a buffer for this tensor occupies.
    pub fn byte_len(&self) -> usize {
        self.numel() * self.dtype.size()
    }
}

/// Input tensor bound to one of the model's input slots.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    spec: TensorSpec,
    data: Vec<u8>,
}

impl InputTensor {
    /// Wrap a buffer whose length matches `spec.byte_len()` exactly.
    pub fn from_bytes(spec: TensorSpec, data: Vec<u8>) -> Result<Self> {
        if data.len() != spec.byte_len() {
            return Err(InferenceError::InvalidInput(format!(
                "'{}' expects {} bytes, got {}",
                spec.name,
                spec.byte_len(),
                data.len()
            )));
        }
        Ok(Self { spec, data })
    }

    /// Create a typed tensor from elements.
    pub fn from_elements<T: Element>(spec: TensorSpec, values: &[T]) -> Result<Self> {
        if spec.dtype != T::DTYPE {
            return Err(InferenceError::InvalidInput(format!(
                "'{}' is {}, got {} elements",
                spec.name,
                spec.dtype,
                T::DTYPE
            )));
        }
        Self::from_bytes(spec, encode_elements(values))
    }

    /// Zero-filled tensor for an input slot.
    pub fn zeros(spec: TensorSpec) -> Self {
        let data = vec![0u8; spec.byte_len()];
        Self { spec, data }
    }

    pub fn spec(&self) -> &TensorSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Get the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.spec.shape
    }

    /// Get the data type of the tensor.
    pub fn dtype(&self) -> TensorType {
        self.spec.dtype
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Decode the buffer into typed elements.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if self.spec.dtype != T::DTYPE {
            return Err(InferenceError::InvalidInput(format!(
                "'{}' is {}, requested {}",
                self.spec.name,
                self.spec.dtype,
                T::DTYPE
            )));
        }
        Ok(decode_elements(&self.data))
    }
}

/// Output tensor from inference.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    name: String,
    dtype: TensorType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl OutputTensor {
    /// Create an output from typed elements produced by a backend.
    pub fn from_elements<T: Element>(
        name: impl Into<String>,
        shape: Vec<usize>,
        values: &[T],
    ) -> Result<Self> {
        let name = name.into();
        let numel: usize = shape.iter().product();
        if numel != values.len() {
            return Err(InferenceError::OutputExtraction(format!(
                "'{}' has shape {:?} but {} elements",
                name,
                shape,
                values.len()
            )));
        }
        Ok(Self {
            name,
            dtype: T::DTYPE,
            shape,
            data: encode_elements(values),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the data type of the tensor.
    pub fn dtype(&self) -> TensorType {
        self.dtype
    }

    /// Raw little-endian buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Try to view the output as a Float32 array.
    pub fn to_f32_array(&self) -> Option<ArrayD<f32>> {
        if self.dtype != TensorType::Float32 {
            return None;
        }
        ArrayD::from_shape_vec(IxDyn(&self.shape), decode_elements(&self.data)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_byte_len() {
        let spec = TensorSpec::new("x", TensorType::Float32, vec![1, 3, 32, 32]);
        assert_eq!(spec.numel(), 3072);
        assert_eq!(spec.byte_len(), 12288);
    }

    #[test]
    fn test_parse_tensor_type() {
        assert_eq!("float32".parse::<TensorType>().unwrap(), TensorType::Float32);
        assert_eq!("U8".parse::<TensorType>().unwrap(), TensorType::Uint8);
        assert!("bf16".parse::<TensorType>().is_err());
    }

    #[test]
    fn test_dynamic_dims_pinned() {
        let spec = TensorSpec::from_dims("x", TensorType::Uint8, &[-1, 224, 224, 3]);
        assert_eq!(spec.shape, vec![1, 224, 224, 3]);
        assert_eq!(spec.dynamic_axes, vec![0]);
        assert!(spec.is_dynamic(0));
        assert!(!spec.is_dynamic(3));
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        let spec = TensorSpec::new("x", TensorType::Float32, vec![2]);
        assert!(InputTensor::from_bytes(spec.clone(), vec![0; 7]).is_err());
        assert!(InputTensor::from_bytes(spec, vec![0; 8]).is_ok());
    }

    #[test]
    fn test_typed_view() {
        let spec = TensorSpec::new("x", TensorType::Float32, vec![2]);
        let tensor = InputTensor::from_elements(spec, &[1.5f32, -2.0]).unwrap();
        assert_eq!(tensor.to_vec::<f32>().unwrap(), vec![1.5, -2.0]);
        assert!(tensor.to_vec::<i64>().is_err());
    }

    #[test]
    fn test_output_shape_checked() {
        assert!(OutputTensor::from_elements("y", vec![2, 2], &[1i64, 2, 3]).is_err());

        let out = OutputTensor::from_elements("y", vec![1, 2], &[0.25f32, 0.75]).unwrap();
        assert_eq!(out.as_bytes().len(), 8);
        let arr = out.to_f32_array().unwrap();
        assert_eq!(arr.shape(), &[1, 2]);
        assert_eq!(arr[[0, 1]], 0.75);
    }
}
