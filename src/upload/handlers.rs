use super::{
    UploadPipeline,
    core::discard_all,
    error::UploadError,
    sniff::format_bytes,
    types::{UploadBatch, UploadTarget},
};
use crate::{
    AppState,
    api::{ApiError, ClientIp, parse_id},
    store::PhotoView,
};
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use std::path::Path as FsPath;
use tracing::info;

const PHOTOS_FIELDS: [&str; 2] = ["photos", "photos[]"];
const CAPTION_FIELD: &str = "caption";

#[derive(Serialize)]
pub struct UploadResponse {
    ok: bool,
    created: Vec<PhotoView>,
    count: usize,
}

pub async fn upload_handler(
    State(app_state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    Path((user_id, album_id)): Path<(String, String)>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_id(&user_id, "Album not found")?;
    let album_id = parse_id(&album_id, "Album not found")?;
    let target = UploadTarget {
        user_id,
        album_id,
        client_ip,
    };

    let pipeline = &app_state.uploads;
    let result = async {
        let dir = pipeline.prepare(user_id, album_id).await?;
        // A body that is not multipart carries no files
        let batch = match multipart {
            Ok(mut multipart) => receive_batch(pipeline, &dir, &mut multipart).await?,
            Err(_) => UploadBatch::default(),
        };
        if batch.files.is_empty() {
            return Err(UploadError::NoFiles);
        }

        info!(
            ip = %target.client_ip,
            album_id = %album_id,
            files = batch.files.len(),
            size = %format_bytes(batch.total_bytes()),
            "Upload started"
        );
        let total_bytes = batch.total_bytes();
        let created = pipeline.process(&target, batch).await?;
        info!(
            ip = %target.client_ip,
            album_id = %album_id,
            created = created.len(),
            total_size = %format_bytes(total_bytes),
            "Upload finished"
        );
        Ok(created)
    }
    .await;

    let created: Vec<PhotoView> = result?
        .iter()
        .map(|record| PhotoView::new(user_id, album_id, record))
        .collect();
    let count = created.len();
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            ok: true,
            created,
            count,
        }),
    ))
}

/// Streams every file part to the album directory and collects the shared
/// caption. On any failure here, all files staged by this request are removed.
async fn receive_batch(
    pipeline: &UploadPipeline,
    dir: &FsPath,
    multipart: &mut Multipart,
) -> Result<UploadBatch, UploadError> {
    let mut batch = UploadBatch::default();

    match stage_fields(pipeline, dir, multipart, &mut batch).await {
        Ok(()) => Ok(batch),
        Err(e) => {
            discard_all(&batch.files).await;
            Err(e)
        }
    }
}

async fn stage_fields(
    pipeline: &UploadPipeline,
    dir: &FsPath,
    multipart: &mut Multipart,
    batch: &mut UploadBatch,
) -> Result<(), UploadError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Multipart(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == CAPTION_FIELD {
            batch.caption = field
                .text()
                .await
                .map_err(|e| UploadError::Multipart(e.body_text()))?;
            continue;
        }

        let Some(original_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if !PHOTOS_FIELDS.contains(&name.as_str()) {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let mut staging = pipeline
            .begin_file(dir, &original_name, content_type.as_deref(), batch.files.len())
            .await?;

        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    staging.discard().await;
                    return Err(UploadError::Multipart(e.body_text()));
                }
            };
            if let Err(e) = staging.write_chunk(&chunk).await {
                staging.discard().await;
                return Err(e);
            }
        }

        batch.files.push(staging.finish().await?);
    }

    Ok(())
}
