//! Binding raw sample bytes to the model's first input.

use nnbench_inference::{InputTensor, TensorSpec};
use thiserror::Error;

use crate::dataset::DatasetKind;
use crate::preprocess::{self, ImagePipeline};

/// Errors raised while binding a sample, before the sample path is known.
#[derive(Error, Debug)]
pub enum BindError {
    /// The buffer cannot fill the model input.
    #[error("model expects {expected} bytes, sample provides {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// The sample is not a decodable image.
    #[error("decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// Turns the bytes of one sample into the tensor for input slot 0.
pub trait InputBinder: Send {
    fn bind(&self, raw: &[u8], spec: &TensorSpec) -> Result<InputTensor, BindError>;
}

/// Copies a pre-packaged tensor blob straight into the input.
///
/// The blob must hold at least `spec.byte_len()` bytes; exactly that many
/// are copied and any trailing bytes are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectTensorBinder;

impl InputBinder for DirectTensorBinder {
    fn bind(&self, raw: &[u8], spec: &TensorSpec) -> Result<InputTensor, BindError> {
        let expected = spec.byte_len();
        if raw.len() < expected {
            return Err(BindError::SizeMismatch {
                expected,
                actual: raw.len(),
            });
        }
        InputTensor::from_bytes(spec.clone(), raw[..expected].to_vec()).map_err(|_| {
            BindError::SizeMismatch {
                expected,
                actual: raw.len(),
            }
        })
    }
}

/// Decodes an image and runs it through the fixed preprocessing pipeline.
#[derive(Debug, Clone, Default)]
pub struct ImageBinder {
    pipeline: ImagePipeline,
}

impl ImageBinder {
    pub fn new(pipeline: ImagePipeline) -> Self {
        Self { pipeline }
    }
}

impl InputBinder for ImageBinder {
    fn bind(&self, raw: &[u8], spec: &TensorSpec) -> Result<InputTensor, BindError> {
        let hwc = self.pipeline.preprocess(raw)?;
        preprocess::to_input_tensor(&hwc, spec)
    }
}

/// Select the binding strategy for a dataset kind.
pub fn binder_for(kind: DatasetKind) -> Box<dyn InputBinder> {
    match kind {
        DatasetKind::DirectTensor => Box::new(DirectTensorBinder),
        DatasetKind::ImageClassification => Box::new(ImageBinder::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nnbench_inference::TensorType;
    use pretty_assertions::assert_eq;

    fn spec() -> TensorSpec {
        TensorSpec::new("x", TensorType::Float32, vec![1, 4])
    }

    #[test]
    fn test_exact_size() {
        let raw: Vec<u8> = (0..16).collect();
        let tensor = DirectTensorBinder.bind(&raw, &spec()).unwrap();
        assert_eq!(tensor.byte_len(), spec().byte_len());
        assert_eq!(tensor.as_bytes(), raw.as_slice());
    }

    #[test]
    fn test_excess_ignored() {
        let raw: Vec<u8> = (0..40).collect();
        let tensor = DirectTensorBinder.bind(&raw, &spec()).unwrap();
        assert_eq!(tensor.byte_len(), 16);
        assert_eq!(tensor.as_bytes(), &raw[..16]);
    }

    #[test]
    fn test_short_buffer() {
        let raw = vec![0u8; 6];
        match DirectTensorBinder.bind(&raw, &spec()) {
            Err(BindError::SizeMismatch { expected, actual }) => {
                assert_eq!((expected, actual), (16, 6));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_image_binder_rejects_garbage() {
        let spec = TensorSpec::new("x", TensorType::Uint8, vec![1, 224, 224, 3]);
        let err = ImageBinder::default().bind(b"nope", &spec).unwrap_err();
        assert!(matches!(err, BindError::Decode(_)));
    }
}
