use ndarray::{Array1, Array2, Array4, ArrayD, IxDyn};
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::path::Path;

use super::network::{LayerKind, TOPOLOGY};

#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("Parameter file not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed parameter file: {0}")]
    Format(String),
    #[error("Missing tensor: {0}")]
    MissingTensor(String),
    #[error("Tensor {name} has dtype {dtype}, expected F32")]
    Dtype { name: String, dtype: String },
    #[error("Tensor {name} has shape {found:?}, expected {expected:?}")]
    Shape {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("Tensor {0} contains non-finite values")]
    NonFinite(String),
}

impl From<safetensors::SafeTensorError> for ParamsError {
    fn from(err: safetensors::SafeTensorError) -> Self {
        ParamsError::Format(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub enum LayerParams {
    Conv {
        weight: Array4<f32>,
        bias: Array1<f32>,
    },
    Linear {
        weight: Array2<f32>,
        bias: Array1<f32>,
    },
}

impl LayerParams {
    fn len(&self) -> usize {
        match self {
            LayerParams::Conv { weight, bias } => weight.len() + bias.len(),
            LayerParams::Linear { weight, bias } => weight.len() + bias.len(),
        }
    }
}

/// Trained weights for every layer of the topology.
///
/// Only constructed through the checked loaders below, so every layer the
/// forward pass needs is present with the exact shape it expects.
#[derive(Debug, Clone)]
pub struct ModelParameters {
    layers: HashMap<&'static str, LayerParams>,
}

impl ModelParameters {
    /// Loads a safetensors export of the trained `state_dict`.
    pub fn load(path: &Path) -> Result<Self, ParamsError> {
        if !path.exists() {
            return Err(ParamsError::NotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        Self::from_safetensors(&bytes)
    }

    pub fn from_safetensors(bytes: &[u8]) -> Result<Self, ParamsError> {
        let archive = SafeTensors::deserialize(bytes)?;
        let mut tensors = HashMap::new();

        for name in expected_tensors().into_iter().map(|(name, _)| name) {
            let view = archive
                .tensor(&name)
                .map_err(|_| ParamsError::MissingTensor(name.clone()))?;
            if view.dtype() != Dtype::F32 {
                return Err(ParamsError::Dtype {
                    name,
                    dtype: format!("{:?}", view.dtype()),
                });
            }
            let values: Vec<f32> = view
                .data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            let array = ArrayD::from_shape_vec(IxDyn(view.shape()), values)
                .map_err(|e| ParamsError::Format(format!("{name}: {e}")))?;
            tensors.insert(name, array);
        }

        let unused = archive.names().len().saturating_sub(tensors.len());
        if unused > 0 {
            log::debug!("Ignoring {} tensors not used by the topology", unused);
        }

        Self::from_tensors(tensors)
    }

    /// Builds a parameter set from named arrays (`cnv1.weight`, `fc2.bias`, ...).
    pub fn from_tensors(mut tensors: HashMap<String, ArrayD<f32>>) -> Result<Self, ParamsError> {
        let mut layers = HashMap::new();

        for spec in TOPOLOGY.iter() {
            let Some((weight_shape, bias_shape)) = spec.kind.parameter_shapes() else {
                continue;
            };
            let weight = take_tensor(&mut tensors, &format!("{}.weight", spec.name), &weight_shape)?;
            let bias = take_tensor(&mut tensors, &format!("{}.bias", spec.name), &bias_shape)?
                .into_dimensionality()
                .map_err(|e| ParamsError::Format(e.to_string()))?;

            let params = match spec.kind {
                LayerKind::Conv2d { .. } => LayerParams::Conv {
                    weight: weight
                        .into_dimensionality()
                        .map_err(|e| ParamsError::Format(e.to_string()))?,
                    bias,
                },
                _ => LayerParams::Linear {
                    weight: weight
                        .into_dimensionality()
                        .map_err(|e| ParamsError::Format(e.to_string()))?,
                    bias,
                },
            };
            layers.insert(spec.name, params);
        }

        Ok(Self { layers })
    }

    /// The degenerate all-zero parameter set; every input scores `[0, 0]`.
    pub fn zeroed() -> Self {
        Self {
            layers: zeroed_layers(),
        }
    }

    /// Zero-filled tensors for every expected key.
    pub fn zeroed_tensors() -> HashMap<String, ArrayD<f32>> {
        expected_tensors()
            .into_iter()
            .map(|(name, shape)| (name, ArrayD::zeros(IxDyn(&shape))))
            .collect()
    }

    pub fn layer(&self, name: &str) -> Option<&LayerParams> {
        self.layers.get(name)
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.values().map(LayerParams::len).sum()
    }
}

/// Every tensor name the topology needs, with its shape.
pub fn expected_tensors() -> Vec<(String, Vec<usize>)> {
    TOPOLOGY
        .iter()
        .filter_map(|spec| {
            spec.kind.parameter_shapes().map(|(weight, bias)| {
                [
                    (format!("{}.weight", spec.name), weight),
                    (format!("{}.bias", spec.name), bias),
                ]
            })
        })
        .flatten()
        .collect()
}

fn take_tensor(
    tensors: &mut HashMap<String, ArrayD<f32>>,
    name: &str,
    expected: &[usize],
) -> Result<ArrayD<f32>, ParamsError> {
    let tensor = tensors
        .remove(name)
        .ok_or_else(|| ParamsError::MissingTensor(name.to_string()))?;
    if tensor.shape() != expected {
        return Err(ParamsError::Shape {
            name: name.to_string(),
            expected: expected.to_vec(),
            found: tensor.shape().to_vec(),
        });
    }
    if tensor.iter().any(|v| !v.is_finite()) {
        return Err(ParamsError::NonFinite(name.to_string()));
    }
    Ok(tensor.as_standard_layout().into_owned())
}

fn zeroed_layers() -> HashMap<&'static str, LayerParams> {
    TOPOLOGY
        .iter()
        .filter_map(|spec| match spec.kind {
            LayerKind::Conv2d {
                in_channels,
                out_channels,
                kernel,
            } => Some((
                spec.name,
                LayerParams::Conv {
                    weight: Array4::zeros((out_channels, in_channels, kernel, kernel)),
                    bias: Array1::zeros(out_channels),
                },
            )),
            LayerKind::Linear {
                in_features,
                out_features,
            } => Some((
                spec.name,
                LayerParams::Linear {
                    weight: Array2::zeros((out_features, in_features)),
                    bias: Array1::zeros(out_features),
                },
            )),
            _ => None,
        })
        .collect()
}
