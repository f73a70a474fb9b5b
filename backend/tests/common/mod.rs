#![allow(dead_code)]

use backend::config::{AppConfig, PipelineConfig};
use backend::pipeline::params::expected_tensors;
use backend::pipeline::{Model, ModelParameters};
use backend::state::{AppState, ModelStatus};
use backend::storage::upload_service::UploadService;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::{ArrayD, IxDyn};
use safetensors::Dtype;
use safetensors::tensor::TensorView;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

pub fn encode_png(image: RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn uniform_gray(width: u32, height: u32, value: u8) -> Vec<u8> {
    encode_png(RgbImage::from_pixel(width, height, Rgb([value, value, value])))
}

/// Grayscale pattern loosely shaped like a scan: dark background, bright ring.
pub fn synthetic_scan(width: u32, height: u32) -> Vec<u8> {
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    encode_png(RgbImage::from_fn(width, height, |x, y| {
        let r = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
        let v = if r < cx * 0.8 { 60 + ((x * 3 + y * 5) % 120) as u8 } else { 5 };
        Rgb([v, v, v])
    }))
}

/// stddev R = 80, G = 10, B = 60.
pub fn color_photo(size: u32) -> Vec<u8> {
    encode_png(RgbImage::from_fn(size, size, |x, y| {
        if (x + y) % 2 == 0 {
            Rgb([48, 118, 68])
        } else {
            Rgb([208, 138, 188])
        }
    }))
}

/// All-zero weights except the output bias, so every input scores `bias`.
pub fn biased_tensors(bias: [f32; 2]) -> HashMap<String, ArrayD<f32>> {
    let mut tensors = ModelParameters::zeroed_tensors();
    tensors.insert(
        "fc2.bias".to_string(),
        ArrayD::from_shape_vec(IxDyn(&[2]), bias.to_vec()).unwrap(),
    );
    tensors
}

/// Small deterministic pseudo-random weights so every layer does real work.
pub fn pseudo_random_tensors() -> HashMap<String, ArrayD<f32>> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    expected_tensors()
        .into_iter()
        .map(|(name, shape)| {
            let fan_in: usize = shape.iter().skip(1).product::<usize>().max(1);
            let scale = 1.0 / (fan_in as f32).sqrt();
            let values = (0..shape.iter().product::<usize>())
                .map(|_| {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    let unit = (state >> 40) as f32 / (1u64 << 24) as f32;
                    (unit * 2.0 - 1.0) * scale
                })
                .collect();
            (name, ArrayD::from_shape_vec(IxDyn(&shape), values).unwrap())
        })
        .collect()
}

pub fn model_from(tensors: HashMap<String, ArrayD<f32>>) -> Model {
    Model::new(
        ModelParameters::from_tensors(tensors).unwrap(),
        PipelineConfig::default(),
    )
}

pub fn write_safetensors(path: &Path, tensors: &HashMap<String, ArrayD<f32>>) {
    let raw: Vec<(String, Vec<usize>, Vec<u8>)> = tensors
        .iter()
        .map(|(name, array)| {
            let bytes = array.iter().flat_map(|v| v.to_le_bytes()).collect();
            (name.clone(), array.shape().to_vec(), bytes)
        })
        .collect();
    let views: Vec<(String, TensorView<'_>)> = raw
        .iter()
        .map(|(name, shape, bytes)| {
            (
                name.clone(),
                TensorView::new(Dtype::F32, shape.clone(), bytes).unwrap(),
            )
        })
        .collect();
    let bytes =
        safetensors::tensor::serialize(views.iter().map(|(name, view)| (name.as_str(), view)), &None)
            .unwrap();
    std::fs::write(path, bytes).unwrap();
}

pub fn app_config(root: &Path) -> AppConfig {
    AppConfig {
        bind_host: "127.0.0.1".to_string(),
        port: 0,
        model_path: root.join("model.safetensors"),
        upload_dir: root.join("uploads"),
        max_upload_bytes: 5 * 1024 * 1024,
        pipeline: PipelineConfig::default(),
    }
}

pub fn state_with(root: &Path, model: ModelStatus) -> AppState {
    state_with_limit(root, model, app_config(root).max_upload_bytes)
}

pub fn state_with_limit(root: &Path, model: ModelStatus, max_upload_bytes: usize) -> AppState {
    let mut config = app_config(root);
    config.max_upload_bytes = max_upload_bytes;
    let uploads = UploadService::new(&config.upload_dir, config.max_upload_bytes).unwrap();
    AppState::with_model(config, model, uploads)
}

pub fn ready_state(root: &Path, model: Model) -> AppState {
    state_with(root, ModelStatus::Ready(model))
}

pub fn unavailable_state(root: &Path) -> AppState {
    state_with(
        root,
        ModelStatus::Unavailable {
            reason: "Parameter file not found: model.safetensors".to_string(),
        },
    )
}

pub fn upload_dir(root: &Path) -> PathBuf {
    root.join("uploads")
}
