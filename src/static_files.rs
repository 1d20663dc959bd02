use crate::{AppState, api, store::METADATA_FILE};
use axum::{
    body::Body,
    extract::{Path as UrlPath, State},
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use std::{
    path::{Component, Path, PathBuf},
    time::UNIX_EPOCH,
};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, error};
use uuid::Uuid;

const INDEX_FILE: &str = "index.html";

/// Serves stored photos and the client application.
#[derive(Clone)]
pub struct StaticFileHandler {
    pub public_dir: PathBuf,
    pub uploads_dir: PathBuf,
}

impl StaticFileHandler {
    pub fn new(public_dir: PathBuf, uploads_dir: PathBuf) -> Self {
        Self {
            public_dir,
            uploads_dir,
        }
    }

    /// `/uploads/{userId}/{albumId}/{filename}`. Only files inside an album
    /// directory are reachable, never the JSON documents.
    pub async fn serve_upload(&self, user_id: &str, album_id: &str, filename: &str) -> Response {
        if Uuid::parse_str(user_id).is_err()
            || Uuid::parse_str(album_id).is_err()
            || filename == METADATA_FILE
            || !is_safe_relative(filename)
        {
            return (StatusCode::NOT_FOUND, "File not found").into_response();
        }

        let file_path = self.uploads_dir.join(user_id).join(album_id).join(filename);
        self.serve_file(&file_path, "public, max-age=31536000").await
    }

    /// Files from the public directory, with `index.html` standing in for
    /// any path that does not exist so client-side routes keep working.
    pub async fn serve_public(&self, path: &str) -> Response {
        let relative = path.trim_start_matches('/');

        if !relative.is_empty() && is_safe_relative(relative) {
            let file_path = self.public_dir.join(relative);
            if tokio::fs::metadata(&file_path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
            {
                return self.serve_file(&file_path, "public, max-age=300").await;
            }
        }

        self.serve_file(&self.public_dir.join(INDEX_FILE), "no-cache")
            .await
    }

    async fn serve_file(&self, file_path: &Path, cache_control: &str) -> Response {
        debug!("Attempting to serve static file: {:?}", file_path);

        let metadata = match tokio::fs::metadata(file_path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return (StatusCode::NOT_FOUND, "File not found").into_response(),
            Err(e) => {
                debug!("Failed to get metadata for {:?}: {}", file_path, e);
                return (StatusCode::NOT_FOUND, "File not found").into_response();
            }
        };

        let file = match File::open(file_path).await {
            Ok(file) => file,
            Err(e) => {
                debug!("Failed to open file {:?}: {}", file_path, e);
                return (StatusCode::NOT_FOUND, "File not found").into_response();
            }
        };

        let content_type = mime_guess::from_path(file_path)
            .first_or_octet_stream()
            .to_string();

        let stream = ReaderStream::new(file);
        let body = Body::from_stream(stream);

        let mut response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, metadata.len())
            .header(header::CACHE_CONTROL, cache_control);

        if let Ok(modified) = metadata.modified()
            && let Ok(duration) = modified.duration_since(UNIX_EPOCH)
        {
            let http_date = httpdate::fmt_http_date(modified);
            response = response.header(header::LAST_MODIFIED, http_date);

            let etag = format!("\"{}-{}\"", duration.as_secs(), metadata.len());
            response = response.header(header::ETAG, etag);
        }

        response.body(body).unwrap_or_else(|e| {
            error!("Failed to build response for {:?}: {}", file_path, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
    }
}

fn is_safe_relative(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
}

pub async fn upload_file_handler(
    State(app_state): State<AppState>,
    UrlPath((user_id, album_id, filename)): UrlPath<(String, String, String)>,
) -> Response {
    app_state
        .static_handler
        .serve_upload(&user_id, &album_id, &filename)
        .await
}

/// Router fallback: unknown `/api/` paths get a JSON 404, everything else
/// goes to the client application.
pub async fn fallback_handler(State(app_state): State<AppState>, uri: Uri) -> Response {
    let path = uri.path();
    if path == "/api" || path.starts_with("/api/") {
        return api::api_not_found_handler().await.into_response();
    }

    app_state.static_handler.serve_public(path).await
}
