use crate::{
    AppState,
    store::{AlbumSummary, PhotoView, StoreError, UserSummary},
    upload::UploadError,
};
use axum::{
    extract::{
        ConnectInfo, FromRequest, FromRequestParts, Path, Request, State,
        rejection::JsonRejection,
    },
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{convert::Infallible, net::SocketAddr};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    Upload(UploadError),
    /// The request body could not be read.
    BadRequest(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Store(e) => ApiError::Store(e),
            other => ApiError::Upload(other),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Store(StoreError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Store(StoreError::Conflict(msg)) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Store(StoreError::NotFound(msg)) => (StatusCode::NOT_FOUND, msg),
            ApiError::Store(e) => {
                error!("Store error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
            ApiError::Upload(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Upload(e) => {
                error!("Upload error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Upload failed".to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Parses a path id. Malformed ids are reported like unknown ones.
pub fn parse_id(raw: &str, not_found: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| StoreError::NotFound(not_found.to_string()).into())
}

/// Address of the caller for log lines: the first `X-Forwarded-For` hop,
/// else the peer address, else `-`.
pub struct ClientIp(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        let ip = match forwarded {
            Some(ip) => ip.to_string(),
            None => parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
                .unwrap_or_else(|| "-".to_string()),
        };

        Ok(ClientIp(ip))
    }
}

#[derive(Deserialize)]
pub struct NameRequest {
    #[serde(default)]
    name: Value,
}

impl NameRequest {
    /// The requested name as text. Numbers and `true` are stringified; null,
    /// `false`, zero, arrays and objects count as no name.
    fn into_name(self) -> String {
        match self.name {
            Value::String(name) => name,
            Value::Number(n) if n.as_f64() != Some(0.0) => n.to_string(),
            Value::Bool(true) => "true".to_string(),
            _ => String::new(),
        }
    }
}

/// Name from a `{"name": ...}` JSON body. A body that is not declared as
/// JSON carries no name, so the store's validation message is reported.
/// Unparseable JSON becomes a 400 `{error}` response.
pub struct NameBody(pub String);

impl<S: Send + Sync> FromRequest<S> for NameBody {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<NameRequest>::from_request(req, state).await {
            Ok(Json(payload)) => Ok(NameBody(payload.into_name())),
            Err(JsonRejection::MissingJsonContentType(_)) => Ok(NameBody(String::new())),
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}

#[derive(Serialize)]
pub struct OkResponse {
    ok: bool,
}

impl OkResponse {
    fn ok() -> Json<Self> {
        Json(Self { ok: true })
    }
}

pub async fn list_users_handler(
    State(app_state): State<AppState>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    Ok(Json(app_state.store.list_users().await?))
}

pub async fn create_user_handler(
    State(app_state): State<AppState>,
    ClientIp(ip): ClientIp,
    NameBody(name): NameBody,
) -> Result<impl IntoResponse, ApiError> {
    let user = app_state.store.create_user(&name).await?;

    info!(ip = %ip, user = %user.name, id = %user.id, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn delete_user_handler(
    State(app_state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path(user_id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    let user_id = parse_id(&user_id, "User not found")?;
    let removed = app_state.store.delete_user(user_id).await?;

    info!(ip = %ip, user = %removed.name, id = %user_id, "User deleted");
    Ok(OkResponse::ok())
}

pub async fn list_albums_handler(
    State(app_state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<AlbumSummary>>, ApiError> {
    let user_id = parse_id(&user_id, "User not found")?;
    Ok(Json(app_state.store.list_albums(user_id).await?))
}

pub async fn create_album_handler(
    State(app_state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path(user_id): Path<String>,
    NameBody(name): NameBody,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_id(&user_id, "User not found")?;
    let album = app_state.store.create_album(user_id, &name).await?;

    info!(ip = %ip, album = %album.name, id = %album.id, "Album created");
    Ok((StatusCode::CREATED, Json(album)))
}

pub async fn delete_album_handler(
    State(app_state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path((user_id, album_id)): Path<(String, String)>,
) -> Result<Json<OkResponse>, ApiError> {
    let user_id = parse_id(&user_id, "Album not found")?;
    let album_id = parse_id(&album_id, "Album not found")?;
    let removed = app_state.store.delete_album(user_id, album_id).await?;

    info!(ip = %ip, album = %removed.name, id = %album_id, "Album deleted");
    Ok(OkResponse::ok())
}

pub async fn list_photos_handler(
    State(app_state): State<AppState>,
    Path((user_id, album_id)): Path<(String, String)>,
) -> Result<Json<Vec<PhotoView>>, ApiError> {
    let user_id = parse_id(&user_id, "Album not found")?;
    let album_id = parse_id(&album_id, "Album not found")?;

    let photos = app_state
        .store
        .list_photos(user_id, album_id)
        .await?
        .iter()
        .map(|record| PhotoView::new(user_id, album_id, record))
        .collect();

    Ok(Json(photos))
}

pub async fn delete_photo_handler(
    State(app_state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path((user_id, album_id, photo_id)): Path<(String, String, String)>,
) -> Result<Json<OkResponse>, ApiError> {
    let user_id = parse_id(&user_id, "Not found")?;
    let album_id = parse_id(&album_id, "Not found")?;
    let photo_id = parse_id(&photo_id, "Not found")?;

    let removed = app_state
        .store
        .delete_photo(user_id, album_id, photo_id)
        .await?;

    info!(ip = %ip, photo_id = %photo_id, file = %removed.filename, "Photo deleted");
    Ok(OkResponse::ok())
}

pub async fn api_not_found_handler() -> ApiError {
    StoreError::NotFound("Not found".to_string()).into()
}
