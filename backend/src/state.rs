use chrono::{DateTime, Utc};
use shared::{ModelStatusReport, PredictionResult};

use crate::config::AppConfig;
use crate::pipeline::network::ARCHITECTURE;
use crate::pipeline::{Model, PipelineError};
use crate::storage::upload_service::UploadService;

pub enum ModelStatus {
    Ready(Model),
    Unavailable { reason: String },
}

/// Everything a request handler needs; built once in `main` and read-only
/// for the lifetime of the server.
pub struct AppState {
    pub config: AppConfig,
    pub model: ModelStatus,
    pub uploads: UploadService,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Loads the model named by `config`. A missing or incompatible parameter
    /// file leaves the state in `ModelStatus::Unavailable` instead of failing.
    pub fn initialize(config: AppConfig, uploads: UploadService) -> Self {
        let model = match Model::load(&config.model_path, config.pipeline.clone()) {
            Ok(model) => {
                log::info!("✅ Model loaded from {}", config.model_path.display());
                ModelStatus::Ready(model)
            }
            Err(e) => {
                log::error!(
                    "❌ Failed to load model from {}: {}",
                    config.model_path.display(),
                    e
                );
                ModelStatus::Unavailable {
                    reason: e.to_string(),
                }
            }
        };
        Self::with_model(config, model, uploads)
    }

    pub fn with_model(config: AppConfig, model: ModelStatus, uploads: UploadService) -> Self {
        Self {
            config,
            model,
            uploads,
            started_at: Utc::now(),
        }
    }

    pub fn model(&self) -> Result<&Model, PipelineError> {
        match &self.model {
            ModelStatus::Ready(model) => Ok(model),
            ModelStatus::Unavailable { reason } => {
                Err(PipelineError::ModelUnavailable(reason.clone()))
            }
        }
    }

    pub fn is_model_ready(&self) -> bool {
        matches!(self.model, ModelStatus::Ready(_))
    }

    /// Runs the pipeline on one upload; refuses up front when no model is loaded.
    pub fn analyze(&self, image_data: &[u8], upload_id: &str) -> Result<PredictionResult, PipelineError> {
        let model = self.model()?;
        log::info!("🧠 Starting model prediction for: {}", upload_id);

        match model.inference(image_data) {
            Ok(result) => {
                log::info!(
                    "✅ Analysis complete for {}: {} with {}% confidence",
                    upload_id,
                    if result.has_tumor { "Tumor detected" } else { "No tumor" },
                    (result.confidence * 100.0).round()
                );
                Ok(result)
            }
            Err(e) => {
                match e.kind() {
                    Some(kind) => log::warn!("❌ {} rejected ({}): {}", upload_id, kind, e),
                    None => log::error!("❌ Inference failed for {}: {}", upload_id, e),
                }
                Err(e)
            }
        }
    }

    pub fn model_report(&self) -> ModelStatusReport {
        match &self.model {
            ModelStatus::Ready(model) => ModelStatusReport {
                loaded: true,
                architecture: ARCHITECTURE.to_string(),
                parameter_count: Some(model.parameters().parameter_count()),
                reason: None,
            },
            ModelStatus::Unavailable { reason } => ModelStatusReport {
                loaded: false,
                architecture: ARCHITECTURE.to_string(),
                parameter_count: None,
                reason: Some(reason.clone()),
            },
        }
    }
}
