use chrono::Utc;
use sha2::{Digest, Sha256};
use shared::{UploadInfo, UploadListing};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use uuid::Uuid;

/// URL prefix under which saved uploads are served.
pub const PUBLIC_PREFIX: &str = "/static/uploads";

#[derive(Clone)]
pub struct UploadService {
    upload_dir: PathBuf,
    max_size: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No image provided")]
    MissingImage,
    #[error("Empty filename")]
    EmptyFileName,
    #[error("File too large: {size} bytes exceeds {max} bytes")]
    FileTooLarge { size: usize, max: usize },
}

#[derive(Debug, Clone)]
pub struct SavedUpload {
    pub stored_name: String,
    pub path: PathBuf,
    pub public_path: String,
    pub image_hash: String,
}

impl UploadService {
    /// Creates the upload directory if it does not exist yet.
    pub fn new(upload_dir: impl Into<PathBuf>, max_size: usize) -> Result<Self, UploadError> {
        let upload_dir = upload_dir.into();
        fs::create_dir_all(&upload_dir)?;
        Ok(Self {
            upload_dir,
            max_size,
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn calculate_image_hash(image_data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(image_data);
        hex::encode(hasher.finalize())
    }

    /// Keeps the final path component and replaces anything outside
    /// `[A-Za-z0-9._-]` with `_`.
    pub fn sanitize_file_name(file_name: &str) -> String {
        let base = file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        let cleaned: String = base
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let cleaned = cleaned.trim_start_matches('.').to_string();
        if cleaned.is_empty() {
            "upload".to_string()
        } else {
            cleaned
        }
    }

    pub fn validate_image_size(&self, image_data: &[u8]) -> Result<(), UploadError> {
        if image_data.is_empty() {
            return Err(UploadError::MissingImage);
        }
        if image_data.len() > self.max_size {
            return Err(UploadError::FileTooLarge {
                size: image_data.len(),
                max: self.max_size,
            });
        }
        Ok(())
    }

    /// Stores the upload as `{unix_timestamp}-{uuid}-{file_name}`.
    pub fn save_upload(&self, image_data: &[u8], file_name: &str) -> Result<SavedUpload, UploadError> {
        if file_name.trim().is_empty() {
            return Err(UploadError::EmptyFileName);
        }
        self.validate_image_size(image_data)?;

        let stored_name = format!(
            "{}-{}-{}",
            Utc::now().timestamp(),
            Uuid::new_v4().simple(),
            Self::sanitize_file_name(file_name)
        );
        let path = self.upload_dir.join(&stored_name);
        fs::write(&path, image_data)?;
        log::info!("✅ Uploaded file saved to: {}", path.display());

        Ok(SavedUpload {
            public_path: format!("{}/{}", PUBLIC_PREFIX, stored_name),
            image_hash: Self::calculate_image_hash(image_data),
            stored_name,
            path,
        })
    }

    pub fn list_uploads(&self) -> Result<UploadListing, UploadError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.upload_dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let created = metadata
                .created()
                .or_else(|_| metadata.modified())
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or_default();
            files.push(UploadInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                created,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(UploadListing {
            upload_folder: self.upload_dir.display().to_string(),
            file_count: files.len(),
            files,
        })
    }
}
