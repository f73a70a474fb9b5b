//! Image acceptance and inference: decode, validate, preprocess, classify, decide.

pub mod decision;
pub mod raw_image;
pub mod model;
pub mod network;
pub mod params;
pub mod preprocess;
pub mod validator;

use shared::RejectionKind;

pub use decision::{ClassProbabilities, ClassScores};
pub use model::Model;
pub use network::InferenceError;
pub use params::{ModelParameters, ParamsError};
pub use preprocess::PreprocessedArray;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid image: {0}")]
    Corrupt(String),
    #[error("Image too small: {width}x{height}, minimum is {min_width}x{min_height}")]
    TooSmall {
        width: u32,
        height: u32,
        min_width: u32,
        min_height: u32,
    },
    #[error("Not a valid MRI scan: {0}")]
    NotMriLike(String),
    #[error("Image is unclear or invalid: confidence {confidence:.3} does not exceed {threshold}")]
    LowConfidence { confidence: f32, threshold: f32 },
    #[error("Model not loaded: {0}")]
    ModelUnavailable(String),
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),
}

impl PipelineError {
    /// The caller-visible rejection kind; `None` for internal failures.
    pub fn kind(&self) -> Option<RejectionKind> {
        match self {
            PipelineError::Corrupt(_) => Some(RejectionKind::Corrupt),
            PipelineError::TooSmall { .. } => Some(RejectionKind::TooSmall),
            PipelineError::NotMriLike(_) => Some(RejectionKind::NotMriLike),
            PipelineError::LowConfidence { .. } => Some(RejectionKind::LowConfidence),
            PipelineError::ModelUnavailable(_) => Some(RejectionKind::ModelUnavailable),
            PipelineError::Inference(_) => None,
        }
    }
}
