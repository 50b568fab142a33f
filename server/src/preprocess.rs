use image::GrayImage;
use image::imageops::FilterType;
use tch::{Device, Tensor};

use crate::error::PipelineError;

pub const INPUT_SIZE: u32 = 224;
const NORM_MEAN: f32 = 0.5;
const NORM_STD: f32 = 0.5;

/// Scales one grayscale plane into the zero-centered range the classifier
/// was trained on: `(x / 255 - 0.5) / 0.5`, i.e. `[-1, 1]`.
pub fn normalize_plane(img: &GrayImage) -> Vec<f32> {
    img.pixels()
        .map(|p| (p.0[0] as f32 / 255.0 - NORM_MEAN) / NORM_STD)
        .collect()
}

/// File path to the `[1, 1, 224, 224]` tensor the classifier consumes,
/// placed on the classifier's device. Decode failures propagate and are
/// caught at the request boundary.
pub fn tensor_from_path(path: &str, device: Device) -> Result<Tensor, PipelineError> {
    // Byte-level read keeps unicode paths working on every platform.
    let bytes = std::fs::read(path)?;
    let gray = image::load_from_memory(&bytes)?.to_luma8();
    let resized = image::imageops::resize(&gray, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
    let plane = normalize_plane(&resized);
    let tensor = Tensor::from_slice(&plane)
        .view([1, 1, INPUT_SIZE as i64, INPUT_SIZE as i64])
        .to_device(device);
    Ok(tensor)
}
