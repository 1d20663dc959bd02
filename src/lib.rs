use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod api;
pub mod startup_checks;
pub mod static_files;
pub mod store;
pub mod upload;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub app: AppConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Holds `users.json` and one directory per user.
    pub uploads_directory: PathBuf,
    /// Client application assets.
    pub public_directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_file_size_bytes: u64,
    pub max_files_per_request: usize,
    pub max_caption_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3999,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Family Photos".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_directory: PathBuf::from("uploads"),
            public_directory: PathBuf::from("public"),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 1024 * 1024 * 1024,
            max_files_per_request: 250,
            max_caption_chars: 300,
        }
    }
}

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub store: store::MetadataStore,
    pub uploads: upload::UploadPipeline,
    pub static_handler: static_files::StaticFileHandler,
    pub config: Config,
}

pub async fn create_app(config: Config) -> Router {
    let store = store::MetadataStore::new(config.storage.uploads_directory.clone());
    let uploads = upload::UploadPipeline::new(store.clone(), config.upload.clone());
    let static_handler = static_files::StaticFileHandler::new(
        config.storage.public_directory.clone(),
        config.storage.uploads_directory.clone(),
    );

    let app_state = AppState {
        store,
        uploads,
        static_handler,
        config: config.clone(),
    };

    Router::new()
        .route(
            "/api/users",
            get(api::list_users_handler).post(api::create_user_handler),
        )
        .route("/api/users/{user_id}", delete(api::delete_user_handler))
        .route(
            "/api/users/{user_id}/albums",
            get(api::list_albums_handler).post(api::create_album_handler),
        )
        .route(
            "/api/users/{user_id}/albums/{album_id}",
            delete(api::delete_album_handler),
        )
        .route(
            "/api/users/{user_id}/albums/{album_id}/photos",
            get(api::list_photos_handler),
        )
        .route(
            "/api/users/{user_id}/albums/{album_id}/photos/{photo_id}",
            delete(api::delete_photo_handler),
        )
        // Per-file and per-request limits are enforced while streaming
        .route(
            "/api/users/{user_id}/albums/{album_id}/upload",
            post(upload::upload_handler).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/uploads/{user_id}/{album_id}/{filename}",
            get(static_files::upload_file_handler),
        )
        .fallback(static_files::fallback_handler)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let method = request.method();
                    let uri = request.uri();
                    let matched_path = request
                        .extensions()
                        .get::<axum::extract::MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::info_span!(
                        "http_request",
                        method = %method,
                        uri = %uri,
                        matched_path,
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    let user_agent = request
                        .headers()
                        .get("user-agent")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("-");

                    tracing::info!(
                        target: "access_log",
                        method = %request.method(),
                        path = %request.uri().path(),
                        user_agent = %user_agent,
                        "request"
                    );
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::info!(
                            target: "access_log",
                            status = %response.status(),
                            latency_ms = %latency.as_millis(),
                            "response"
                        );
                    },
                ),
        )
        .with_state(app_state)
}
