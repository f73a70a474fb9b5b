use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use backend::config::AppConfig;
use backend::routes::configure_routes;
use backend::state::AppState;
use backend::storage::upload_service::UploadService;
use std::env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let uploads = UploadService::new(&config.upload_dir, config.max_upload_bytes).map_err(|e| {
        log::error!(
            "Failed to prepare upload directory {}: {}",
            config.upload_dir.display(),
            e
        );
        std::io::Error::other(e.to_string())
    })?;

    let bind_address = config.bind_address();
    let upload_dir = config.upload_dir.clone();
    let max_upload_bytes = config.max_upload_bytes;

    // A missing model is reported through /api/health rather than aborting startup.
    let state = web::Data::new(AppState::initialize(config, uploads));
    if !state.is_model_ready() {
        log::warn!("Serving without a model; analysis requests will fail until restart");
    }

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .wrap(actix_web::middleware::Logger::default())
            .app_data(state.clone())
            .configure(|cfg| configure_routes(cfg, upload_dir.clone(), max_upload_bytes))
    })
    .bind(&bind_address)?
    .run()
    .await
}
