use std::path::Path;
use std::sync::Arc;

use shared::PredictionResult;

use super::decision::{self, ClassScores};
use super::network::{self, InferenceError};
use super::params::{ModelParameters, ParamsError};
use super::preprocess::{self, PreprocessedArray};
use super::raw_image::RawImage;
use super::validator::{self, RejectReason};
use super::PipelineError;
use crate::config::PipelineConfig;

/// Loaded classifier plus the tunables of the stages around it.
///
/// Cloning is cheap and every clone reads the same parameters; a forward pass
/// allocates its own buffers, so clones can run on different threads at once.
#[derive(Clone)]
pub struct Model {
    params: Arc<ModelParameters>,
    config: Arc<PipelineConfig>,
}

impl Model {
    pub fn new(params: ModelParameters, config: PipelineConfig) -> Self {
        Self {
            params: Arc::new(params),
            config: Arc::new(config),
        }
    }

    pub fn load(model_path: &Path, config: PipelineConfig) -> Result<Self, ParamsError> {
        let params = ModelParameters::load(model_path)?;
        log::info!(
            "Loaded {} parameters from {}",
            params.parameter_count(),
            model_path.display()
        );
        Ok(Self::new(params, config))
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.params
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Full pipeline on uploaded file bytes.
    pub fn inference(&self, image: &[u8]) -> Result<PredictionResult, PipelineError> {
        let image = RawImage::decode(image)?;
        log::debug!(
            "Decoded {}x{} image (stored as {:?})",
            image.width(),
            image.height(),
            image.source_mode()
        );
        self.check(&image)?;
        let tensor = preprocess::preprocess(&image, &self.config.normalization);
        let scores = self.infer(&tensor)?;
        self.calculate_result(&scores)
    }

    /// Runs the validator and turns a rejection into its error.
    pub fn check(&self, image: &RawImage) -> Result<(), PipelineError> {
        let limits = &self.config.validation;
        let verdict = validator::validate(image, limits);
        match verdict.reason {
            None => Ok(()),
            Some(RejectReason::TooSmall) => Err(PipelineError::TooSmall {
                width: image.width(),
                height: image.height(),
                min_width: limits.min_width,
                min_height: limits.min_height,
            }),
            Some(RejectReason::NotMriLike) => Err(PipelineError::NotMriLike(
                match verdict.channel_stddev {
                    Some(stddev) => format!(
                        "channel deviation spread {:.2} exceeds {}",
                        validator::stddev_spread(&stddev),
                        limits.max_stddev_spread
                    ),
                    None => format!("expected a three-channel image, got {:?}", image.color_mode()),
                },
            )),
            // decode failures surface from `RawImage::decode`, before validation
            Some(RejectReason::Corrupt) => {
                Err(PipelineError::Corrupt("image failed validation".to_string()))
            }
        }
    }

    pub fn infer(&self, tensor: &PreprocessedArray) -> Result<ClassScores, InferenceError> {
        network::forward(tensor, &self.params)
    }

    pub fn calculate_result(&self, scores: &ClassScores) -> Result<PredictionResult, PipelineError> {
        decision::decide(scores, &self.config.decision)
    }
}
