use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Class labels in network output order.
pub const CLASS_LABELS: [&str; 2] = ["No Tumor", "Tumor"];

#[derive(Serialize, Deserialize, Clone)]
pub struct InferenceRequest {
    /// Base64-encoded image file contents.
    pub image_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub has_tumor: bool,
    pub tumor_type: Option<String>,
    pub confidence: f32,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString, EnumIter,
)]
pub enum RejectionKind {
    TooSmall,
    NotMriLike,
    Corrupt,
    LowConfidence,
    ModelUnavailable,
}

impl RejectionKind {
    /// Rejections caused by the uploaded content rather than the service.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, RejectionKind::ModelUnavailable)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<RejectionKind>,
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    #[serde(flatten)]
    pub prediction: PredictionResult,
    pub uploaded_path: String,
    pub image_hash: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelStatusReport {
    pub loaded: bool,
    pub architecture: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub model_status: ModelStatusReport,
    pub upload_folder: String,
    pub server_time: String,
    pub uptime_seconds: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UploadInfo {
    pub name: String,
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub created: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UploadListing {
    pub upload_folder: String,
    pub file_count: usize,
    pub files: Vec<UploadInfo>,
}
