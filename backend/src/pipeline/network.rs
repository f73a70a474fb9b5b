//! Fixed classifier topology and its forward pass.
//!
//! The network is an ordered list of [`LayerSpec`] descriptors evaluated by
//! [`apply_layer`]. Convolutions use stride 1 and no padding, pooling floors
//! odd sizes, so the layer list is only valid for a `(3, 128, 128)` input:
//!
//! ```text
//! (3,128,128) -> cnv1 (16,124,124) -> pool (16,62,62)
//!             -> cnv2 (32,58,58)   -> pool (32,29,29)
//!             -> cnv3 (64,25,25)   -> pool (64,12,12)
//!             -> cnv4 (128,8,8)    -> pool (128,4,4)
//!             -> flatten 2048 -> fc1 1024 -> fc2 2
//! ```

use ndarray::{Array1, Array2, Array3, Array4, Axis, s};

use super::decision::ClassScores;
use super::params::{LayerParams, ModelParameters};
use super::preprocess::PreprocessedArray;

pub const LEAKY_RELU_SLOPE: f32 = 0.01;
pub const ARCHITECTURE: &str = "CNNModel(4x conv5-pool2-leaky, fc 2048-1024-2)";

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Layer {layer} expected input shape {expected}, got {found:?}")]
    Shape {
        layer: &'static str,
        expected: String,
        found: Vec<usize>,
    },
    #[error("No parameters loaded for layer {0}")]
    MissingParameters(&'static str),
    #[error("Reshape failed: {0}")]
    Reshape(#[from] ndarray::ShapeError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerKind {
    Conv2d {
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
    },
    MaxPool2d {
        size: usize,
    },
    LeakyRelu {
        negative_slope: f32,
    },
    Flatten,
    Linear {
        in_features: usize,
        out_features: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerSpec {
    /// Parameter key prefix for layers that carry weights.
    pub name: &'static str,
    pub kind: LayerKind,
}

const fn conv(name: &'static str, in_channels: usize, out_channels: usize) -> LayerSpec {
    LayerSpec {
        name,
        kind: LayerKind::Conv2d {
            in_channels,
            out_channels,
            kernel: 5,
        },
    }
}

const fn linear(name: &'static str, in_features: usize, out_features: usize) -> LayerSpec {
    LayerSpec {
        name,
        kind: LayerKind::Linear {
            in_features,
            out_features,
        },
    }
}

const fn pool(name: &'static str) -> LayerSpec {
    LayerSpec {
        name,
        kind: LayerKind::MaxPool2d { size: 2 },
    }
}

const fn leaky(name: &'static str) -> LayerSpec {
    LayerSpec {
        name,
        kind: LayerKind::LeakyRelu {
            negative_slope: LEAKY_RELU_SLOPE,
        },
    }
}

pub const TOPOLOGY: [LayerSpec; 16] = [
    conv("cnv1", 3, 16),
    pool("pool1"),
    leaky("leaky1"),
    conv("cnv2", 16, 32),
    pool("pool2"),
    leaky("leaky2"),
    conv("cnv3", 32, 64),
    pool("pool3"),
    leaky("leaky3"),
    conv("cnv4", 64, 128),
    pool("pool4"),
    leaky("leaky4"),
    LayerSpec {
        name: "flatten",
        kind: LayerKind::Flatten,
    },
    linear("fc1", 128 * 4 * 4, 1024),
    leaky("leaky5"),
    linear("fc2", 1024, 2),
];

impl LayerKind {
    /// Shapes of the `weight` and `bias` tensors, for layers that have them.
    pub fn parameter_shapes(&self) -> Option<(Vec<usize>, Vec<usize>)> {
        match *self {
            LayerKind::Conv2d {
                in_channels,
                out_channels,
                kernel,
            } => Some((
                vec![out_channels, in_channels, kernel, kernel],
                vec![out_channels],
            )),
            LayerKind::Linear {
                in_features,
                out_features,
            } => Some((vec![out_features, in_features], vec![out_features])),
            _ => None,
        }
    }
}

impl LayerSpec {
    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, InferenceError> {
        let mismatch = |expected: String| InferenceError::Shape {
            layer: self.name,
            expected,
            found: input.to_vec(),
        };

        match self.kind {
            LayerKind::Conv2d {
                in_channels,
                out_channels,
                kernel,
            } => match *input {
                [c, h, w] if c == in_channels && h >= kernel && w >= kernel => {
                    Ok(vec![out_channels, h - kernel + 1, w - kernel + 1])
                }
                _ => Err(mismatch(format!("({in_channels}, >={kernel}, >={kernel})"))),
            },
            LayerKind::MaxPool2d { size } => match *input {
                [c, h, w] if h >= size && w >= size => Ok(vec![c, h / size, w / size]),
                _ => Err(mismatch(format!("(C, >={size}, >={size})"))),
            },
            LayerKind::LeakyRelu { .. } => Ok(input.to_vec()),
            LayerKind::Flatten => Ok(vec![input.iter().product()]),
            LayerKind::Linear {
                in_features,
                out_features,
            } => match *input {
                [n] if n == in_features => Ok(vec![out_features]),
                _ => Err(mismatch(format!("({in_features})"))),
            },
        }
    }
}

/// Output shape after every layer, starting from `input`.
pub fn shape_trace(input: &[usize]) -> Result<Vec<(&'static str, Vec<usize>)>, InferenceError> {
    let mut shape = input.to_vec();
    let mut trace = Vec::with_capacity(TOPOLOGY.len());
    for spec in TOPOLOGY.iter() {
        shape = spec.output_shape(&shape)?;
        trace.push((spec.name, shape.clone()));
    }
    Ok(trace)
}

/// Intermediate value flowing between layers.
#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    Spatial(Array3<f32>),
    Flat(Array1<f32>),
}

impl Activation {
    pub fn shape(&self) -> &[usize] {
        match self {
            Activation::Spatial(a) => a.shape(),
            Activation::Flat(a) => a.shape(),
        }
    }
}

pub fn apply_layer(
    spec: &LayerSpec,
    input: Activation,
    params: &ModelParameters,
) -> Result<Activation, InferenceError> {
    spec.output_shape(input.shape())?;

    match (spec.kind, input) {
        (LayerKind::Conv2d { .. }, Activation::Spatial(x)) => match params.layer(spec.name) {
            Some(LayerParams::Conv { weight, bias }) => {
                Ok(Activation::Spatial(conv2d(&x, weight, bias)?))
            }
            _ => Err(InferenceError::MissingParameters(spec.name)),
        },
        (LayerKind::MaxPool2d { size }, Activation::Spatial(x)) => {
            Ok(Activation::Spatial(max_pool2d(&x, size)))
        }
        (LayerKind::LeakyRelu { negative_slope }, Activation::Spatial(mut x)) => {
            x.mapv_inplace(|v| leaky_relu(v, negative_slope));
            Ok(Activation::Spatial(x))
        }
        (LayerKind::LeakyRelu { negative_slope }, Activation::Flat(mut x)) => {
            x.mapv_inplace(|v| leaky_relu(v, negative_slope));
            Ok(Activation::Flat(x))
        }
        (LayerKind::Flatten, Activation::Spatial(x)) => {
            Ok(Activation::Flat(x.iter().copied().collect()))
        }
        (LayerKind::Flatten, flat @ Activation::Flat(_)) => Ok(flat),
        (LayerKind::Linear { .. }, Activation::Flat(x)) => match params.layer(spec.name) {
            Some(LayerParams::Linear { weight, bias }) => {
                Ok(Activation::Flat(weight.dot(&x) + bias))
            }
            _ => Err(InferenceError::MissingParameters(spec.name)),
        },
        (_, other) => Err(InferenceError::Shape {
            layer: spec.name,
            expected: format!("{:?} input", spec.kind),
            found: other.shape().to_vec(),
        }),
    }
}

/// Runs the whole topology and returns the raw class scores.
pub fn forward(
    input: &PreprocessedArray,
    params: &ModelParameters,
) -> Result<ClassScores, InferenceError> {
    let mut activation = Activation::Spatial(input.view().to_owned());
    for spec in TOPOLOGY.iter() {
        activation = apply_layer(spec, activation, params)?;
    }

    match activation {
        Activation::Flat(scores) if scores.len() == 2 => Ok(ClassScores([scores[0], scores[1]])),
        other => Err(InferenceError::Shape {
            layer: "output",
            expected: "(2)".to_string(),
            found: other.shape().to_vec(),
        }),
    }
}

fn leaky_relu(v: f32, negative_slope: f32) -> f32 {
    if v >= 0.0 { v } else { v * negative_slope }
}

/// Valid (unpadded, stride 1) cross-correlation via im2col.
fn conv2d(
    input: &Array3<f32>,
    weight: &Array4<f32>,
    bias: &Array1<f32>,
) -> Result<Array3<f32>, InferenceError> {
    let (channels, height, width) = input.dim();
    let (out_channels, _, kernel, _) = weight.dim();
    let (out_h, out_w) = (height - kernel + 1, width - kernel + 1);

    let mut cols = Array2::<f32>::zeros((channels * kernel * kernel, out_h * out_w));
    for c in 0..channels {
        for ky in 0..kernel {
            for kx in 0..kernel {
                let row = (c * kernel + ky) * kernel + kx;
                let window = input.slice(s![c, ky..ky + out_h, kx..kx + out_w]);
                cols.row_mut(row)
                    .into_shape_with_order((out_h, out_w))?
                    .assign(&window);
            }
        }
    }

    let kernels = weight
        .view()
        .into_shape_with_order((out_channels, channels * kernel * kernel))?;
    let mut out = kernels.dot(&cols);
    out += &bias.view().insert_axis(Axis(1));
    Ok(out.into_shape_with_order((out_channels, out_h, out_w))?)
}

fn max_pool2d(input: &Array3<f32>, size: usize) -> Array3<f32> {
    let (channels, height, width) = input.dim();
    Array3::from_shape_fn((channels, height / size, width / size), |(c, y, x)| {
        input
            .slice(s![c, y * size..(y + 1) * size, x * size..(x + 1) * size])
            .fold(f32::NEG_INFINITY, |m, &v| m.max(v))
    })
}
