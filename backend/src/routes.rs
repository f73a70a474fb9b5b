use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use serde_json::json;
use shared::{AnalysisResponse, ErrorResponse, HealthResponse, InferenceRequest, RejectionKind};
use std::path::PathBuf;

use crate::pipeline::PipelineError;
use crate::state::AppState;
use crate::storage::upload_service::{PUBLIC_PREFIX, SavedUpload, UploadError};

pub fn configure_routes(cfg: &mut web::ServiceConfig, upload_dir: PathBuf, max_upload_bytes: usize) {
    // base64 inflates by 4/3
    let json_limit = max_upload_bytes / 3 * 4 + 4096;

    cfg.service(web::resource("/api/health").route(web::get().to(health)))
        .service(web::resource("/api/analyze").route(web::post().to(handle_analyze)))
        .service(
            web::resource("/api/analyze/base64")
                .app_data(web::JsonConfig::default().limit(json_limit))
                .route(web::post().to(handle_analyze_base64)),
        )
        .service(
            web::resource("/api/test")
                .route(web::get().to(test_endpoint))
                .route(web::post().to(test_endpoint)),
        )
        .service(web::resource("/api/debug/uploads").route(web::get().to(list_uploads)))
        .service(Files::new(PUBLIC_PREFIX, upload_dir));
}

fn error_body(kind: Option<RejectionKind>, error: impl Into<String>) -> ErrorResponse {
    ErrorResponse {
        kind,
        error: error.into(),
    }
}

/// 400 for problems with the upload itself, 500 when the service cannot answer.
pub fn rejection_response(e: &PipelineError) -> HttpResponse {
    let body = error_body(e.kind(), e.to_string());
    match e.kind() {
        Some(kind) if kind.is_client_error() => HttpResponse::BadRequest().json(body),
        _ => HttpResponse::InternalServerError().json(body),
    }
}

fn upload_error_response(e: &UploadError) -> HttpResponse {
    match e {
        UploadError::FileTooLarge { .. } => HttpResponse::PayloadTooLarge().json(error_body(None, e.to_string())),
        UploadError::Io(_) => {
            error!("❌ Save failed: {}", e);
            HttpResponse::InternalServerError().json(error_body(None, format!("Could not save file: {}", e)))
        }
        UploadError::MissingImage | UploadError::EmptyFileName => {
            HttpResponse::BadRequest().json(error_body(None, e.to_string()))
        }
    }
}

/// Saves the upload, then runs the pipeline on the blocking pool.
async fn analyze_upload(
    state: web::Data<AppState>,
    image_data: Vec<u8>,
    file_name: &str,
) -> Result<HttpResponse, Error> {
    let saved: SavedUpload = match state.uploads.save_upload(&image_data, file_name) {
        Ok(saved) => saved,
        Err(e) => return Ok(upload_error_response(&e)),
    };

    let upload_id = saved.stored_name.clone();
    let worker_state = state.clone();
    let outcome = web::block(move || worker_state.analyze(&image_data, &upload_id)).await?;

    Ok(match outcome {
        Ok(prediction) => HttpResponse::Ok().json(AnalysisResponse {
            prediction,
            uploaded_path: saved.public_path,
            image_hash: saved.image_hash,
        }),
        Err(e) => rejection_response(&e),
    })
}

fn model_unavailable(state: &AppState) -> Option<HttpResponse> {
    match state.model() {
        Ok(_) => None,
        Err(e) => {
            error!("❌ Model not loaded, cannot process request");
            Some(rejection_response(&e))
        }
    }
}

async fn handle_analyze(state: web::Data<AppState>, mut payload: Multipart) -> Result<HttpResponse, Error> {
    info!("📥 Received image analysis request");
    if let Some(response) = model_unavailable(&state) {
        return Ok(response);
    }

    let max_size = state.uploads.max_size();
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(mut field) = payload.try_next().await? {
        if field.name() != Some("image") {
            continue;
        }
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or_default()
            .to_string();

        let mut image_data = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk?;
            if image_data.len() + data.len() > max_size {
                warn!("❌ Upload exceeds {} bytes", max_size);
                return Ok(upload_error_response(&UploadError::FileTooLarge {
                    size: image_data.len() + data.len(),
                    max: max_size,
                }));
            }
            image_data.extend_from_slice(&data);
        }
        upload = Some((file_name, image_data));
        break;
    }

    let Some((file_name, image_data)) = upload else {
        warn!("❌ No image file in request");
        return Ok(upload_error_response(&UploadError::MissingImage));
    };
    if file_name.trim().is_empty() {
        warn!("❌ Empty filename in request");
        return Ok(upload_error_response(&UploadError::EmptyFileName));
    }

    analyze_upload(state, image_data, &file_name).await
}

async fn handle_analyze_base64(
    state: web::Data<AppState>,
    request: web::Json<InferenceRequest>,
) -> Result<HttpResponse, Error> {
    info!("📥 Received base64 image analysis request");
    if let Some(response) = model_unavailable(&state) {
        return Ok(response);
    }

    let request = request.into_inner();
    // accept data URLs as produced by FileReader.readAsDataURL
    let encoded = match request.image_data.split_once(";base64,") {
        Some((_, data)) => data,
        None => request.image_data.as_str(),
    };
    let image_data = match STANDARD.decode(encoded.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("❌ Invalid base64 payload: {}", e);
            return Ok(HttpResponse::BadRequest().json(error_body(None, format!("Invalid base64 image data: {}", e))));
        }
    };
    let file_name = request.file_name.unwrap_or_else(|| "upload".to_string());

    analyze_upload(state, image_data, &file_name).await
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    let loaded = state.is_model_ready();
    let now = chrono::Utc::now();
    let report = HealthResponse {
        status: if loaded { "healthy" } else { "error" }.to_string(),
        model_loaded: loaded,
        model_status: state.model_report(),
        upload_folder: state.uploads.upload_dir().display().to_string(),
        server_time: now.to_rfc3339(),
        uptime_seconds: (now - state.started_at).num_seconds(),
    };

    if loaded {
        HttpResponse::Ok().json(report)
    } else {
        HttpResponse::InternalServerError().json(report)
    }
}

async fn test_endpoint(req: HttpRequest) -> HttpResponse {
    info!("Test endpoint called");
    HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Test endpoint working correctly",
        "method": req.method().as_str(),
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn list_uploads(state: web::Data<AppState>) -> HttpResponse {
    match state.uploads.list_uploads() {
        Ok(listing) => HttpResponse::Ok().json(listing),
        Err(e) => {
            error!("Error listing uploads: {:?}", e);
            HttpResponse::InternalServerError().json(error_body(None, format!("Error listing uploads: {}", e)))
        }
    }
}
