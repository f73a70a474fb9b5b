use image::imageops::{self, FilterType};
use ndarray::{Array3, ArrayView3};

use super::raw_image::RawImage;
use crate::config::NormalizationConfig;

/// Side length of the square network input.
pub const INPUT_SIZE: u32 = 128;
pub const INPUT_CHANNELS: usize = 3;

/// Normalized CHW network input, always `(3, 128, 128)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedArray(Array3<f32>);

impl PreprocessedArray {
    pub const SHAPE: [usize; 3] = [INPUT_CHANNELS, INPUT_SIZE as usize, INPUT_SIZE as usize];

    /// Wraps an already normalized array; `None` unless it is exactly `(3, 128, 128)`.
    pub fn from_array(array: Array3<f32>) -> Option<Self> {
        (array.shape() == Self::SHAPE).then_some(Self(array))
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.0.view()
    }

    pub fn into_inner(self) -> Array3<f32> {
        self.0
    }
}

/// Bilinear resize to 128x128 (aspect ratio not kept), scale to [0, 1] and
/// apply `(v - mean_c) / std_c` per channel.
pub fn preprocess(image: &RawImage, norm: &NormalizationConfig) -> PreprocessedArray {
    let rgb = image.as_dynamic().to_rgb8();
    let resized = imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

    let alpha: [f32; 3] = std::array::from_fn(|c| 1.0 / (255.0 * norm.std[c]));
    let beta: [f32; 3] = std::array::from_fn(|c| -norm.mean[c] / norm.std[c]);

    let array = Array3::from_shape_fn(PreprocessedArray::SHAPE, |(c, y, x)| {
        let v = resized.get_pixel(x as u32, y as u32).0[c] as f32;
        v * alpha[c] + beta[c]
    });
    PreprocessedArray(array)
}
