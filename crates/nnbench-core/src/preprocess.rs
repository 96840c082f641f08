//! Image preprocessing for classification models.
//!
//! The pipeline is fixed: decode, resize to 256x256, center-crop 224x224.
//! Resizing uses bilinear filtering (`FilterType::Triangle`) and ignores
//! the source aspect ratio, so the output shape never depends on the input.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageError};
use ndarray::{Array3, ArrayView3};
use tracing::trace;

use nnbench_inference::{InputTensor, TensorSpec, TensorType};

use crate::binder::BindError;

/// Edge of the square canvas images are resized to.
pub const RESIZE_EDGE: u32 = 256;

/// Edge of the square region cut from the resized canvas.
pub const CROP_EDGE: u32 = 224;

/// Channels after decoding (RGB).
pub const CHANNELS: usize = 3;

/// Decode, resize and center-crop pipeline.
#[derive(Debug, Clone)]
pub struct ImagePipeline {
    resize: (u32, u32),
    crop: (u32, u32),
    filter: FilterType,
}

impl ImagePipeline {
    pub fn new() -> Self {
        Self {
            resize: (RESIZE_EDGE, RESIZE_EDGE),
            crop: (CROP_EDGE, CROP_EDGE),
            filter: FilterType::Triangle,
        }
    }

    /// Parse encoded bytes; the format is sniffed from the content.
    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, ImageError> {
        image::load_from_memory(bytes)
    }

    pub fn resize(&self, image: &DynamicImage) -> DynamicImage {
        image.resize_exact(self.resize.0, self.resize.1, self.filter)
    }

    /// Cut the central crop region. Images smaller than the crop are
    /// returned whole.
    pub fn center_crop(&self, image: &DynamicImage) -> DynamicImage {
        let (width, height) = image.dimensions();
        let crop_w = self.crop.0.min(width);
        let crop_h = self.crop.1.min(height);
        let x = (width - crop_w) / 2;
        let y = (height - crop_h) / 2;
        image.crop_imm(x, y, crop_w, crop_h)
    }

    /// Run all three stages and return an HWC `u8` array.
    pub fn preprocess(&self, bytes: &[u8]) -> Result<Array3<u8>, ImageError> {
        let decoded = self.decode(bytes)?;
        trace!("Decoded image {}x{}", decoded.width(), decoded.height());

        let cropped = self.center_crop(&self.resize(&decoded));
        let rgb = cropped.to_rgb8();
        let (width, height) = rgb.dimensions();

        Ok(Array3::from_shape_fn(
            (height as usize, width as usize, CHANNELS),
            |(y, x, c)| rgb.get_pixel(x as u32, y as u32)[c],
        ))
    }
}

impl Default for ImagePipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Channel axis sits before the spatial axes, e.g. `[1, 3, 224, 224]`.
fn is_channels_first(shape: &[usize], channels: usize) -> bool {
    let rank = shape.len();
    rank >= 3 && shape[rank - 3] == channels && shape[rank - 1] != channels
}

/// Fill symbolic spatial axes of an image input with the image size.
///
/// A static channel axis in front of the last two axes marks the input as
/// channels-first; otherwise the spatial axes are the two before the last.
fn resolve_spatial_dims(
    spec: &TensorSpec,
    (height, width, channels): (usize, usize, usize),
) -> TensorSpec {
    let rank = spec.shape.len();
    let mut resolved = spec.clone();
    if rank < 3 || spec.dynamic_axes.is_empty() {
        return resolved;
    }

    let spatial = if spec.shape[rank - 3] == channels && !spec.is_dynamic(rank - 3) {
        [rank - 2, rank - 1]
    } else {
        [rank - 3, rank - 2]
    };
    for (axis, size) in spatial.into_iter().zip([height, width]) {
        if spec.is_dynamic(axis) {
            resolved.shape[axis] = size;
        }
    }
    resolved
}

/// Lay an HWC image out to match the model's input spec.
///
/// `uint8` inputs receive the pixels unchanged, `float32` inputs receive
/// them widened without normalization. The layout follows the input shape:
/// NCHW when the channel axis precedes the spatial axes, NHWC otherwise.
/// Symbolic height and width are taken from the image.
pub fn to_input_tensor(hwc: &Array3<u8>, spec: &TensorSpec) -> Result<InputTensor, BindError> {
    let spec = &resolve_spatial_dims(spec, hwc.dim());
    let mismatch = || BindError::SizeMismatch {
        expected: spec.byte_len(),
        actual: hwc.len() * spec.dtype.size(),
    };

    if spec.numel() != hwc.len() {
        return Err(mismatch());
    }

    let (_, _, channels) = hwc.dim();
    let view: ArrayView3<u8> = if is_channels_first(&spec.shape, channels) {
        hwc.view().permuted_axes([2, 0, 1])
    } else {
        hwc.view()
    };

    let tensor = match spec.dtype {
        TensorType::Uint8 => {
            let data: Vec<u8> = view.iter().copied().collect();
            InputTensor::from_elements(spec.clone(), &data)
        }
        TensorType::Float32 => {
            let data: Vec<f32> = view.iter().map(|&v| f32::from(v)).collect();
            InputTensor::from_elements(spec.clone(), &data)
        }
        _ => return Err(mismatch()),
    };
    tensor.map_err(|_| mismatch())
}
