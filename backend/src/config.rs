use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

const DEFAULT_PORT: u16 = 5001;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Process-level settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "PORT".into(),
                message: e.to_string(),
            })?,
            Err(_) => DEFAULT_PORT,
        };

        let max_upload_bytes = match env::var("MAX_UPLOAD_BYTES") {
            Ok(raw) => raw.parse::<usize>().map_err(|e| ConfigError::InvalidValue {
                key: "MAX_UPLOAD_BYTES".into(),
                message: e.to_string(),
            })?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let pipeline_path = env::var("PIPELINE_CONFIG")
            .unwrap_or_else(|_| "config/pipeline.yaml".to_string());
        let pipeline = PipelineConfig::load_or_default(Path::new(&pipeline_path))?;

        Ok(Self {
            bind_host: env::var("BIND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            model_path: env::var("MODEL_PATH")
                .unwrap_or_else(|_| "model/model.safetensors".to_string())
                .into(),
            upload_dir: env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "static/uploads".to_string())
                .into(),
            max_upload_bytes,
            pipeline,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

/// Tunables of the acceptance and decision stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub validation: ValidationConfig,
    pub normalization: NormalizationConfig,
    pub decision: DecisionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_width: u32,
    pub min_height: u32,
    /// Upper bound on |sd_R - sd_G| + |sd_G - sd_B|.
    pub max_stddev_spread: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_width: 50,
            min_height: 50,
            max_stddev_spread: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub confidence_threshold: f32,
    pub labels: Vec<String>,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            labels: shared::CLASS_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Loads `path`, falling back to the built-in defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            log::info!("Loading pipeline configuration from {}", path.display());
            Self::load(path)
        } else {
            log::warn!(
                "Pipeline configuration {} not found, using defaults",
                path.display()
            );
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        if self.validation.min_width == 0 || self.validation.min_height == 0 {
            return Err(invalid(
                "validation.min_width/min_height",
                "minimum dimensions must be positive".into(),
            ));
        }
        if !(self.validation.max_stddev_spread >= 0.0) {
            return Err(invalid(
                "validation.max_stddev_spread",
                format!("must be non-negative, got {}", self.validation.max_stddev_spread),
            ));
        }
        for (i, &s) in self.normalization.std.iter().enumerate() {
            if !(s > 0.0) {
                return Err(invalid(
                    "normalization.std",
                    format!("standard deviation at index {i} must be greater than 0, got {s}"),
                ));
            }
        }
        let threshold = self.decision.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(invalid(
                "decision.confidence_threshold",
                format!("must lie in [0, 1], got {threshold}"),
            ));
        }
        if self.decision.labels.len() != 2 {
            return Err(invalid(
                "decision.labels",
                format!("expected 2 labels, got {}", self.decision.labels.len()),
            ));
        }
        Ok(())
    }
}
