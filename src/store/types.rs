use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest user or album name kept after trimming.
pub const MAX_NAME_CHARS: usize = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One entry of an album's `metadata.json`. The image itself lives next to
/// the document under `filename`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub id: Uuid,
    pub filename: String,
    #[serde(default)]
    pub caption: String,
    pub uploaded_at: DateTime<Utc>,
}

impl PhotoRecord {
    pub fn new(filename: String, caption: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename,
            caption,
            uploaded_at: Utc::now(),
        }
    }

    /// Stored filenames are generated server side and must be a single path
    /// component.
    pub fn has_plain_filename(&self) -> bool {
        is_plain_filename(&self.filename)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub album_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumSummary {
    pub id: Uuid,
    pub name: String,
    pub count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoView {
    pub id: Uuid,
    pub url: String,
    pub caption: String,
    pub uploaded_at: DateTime<Utc>,
}

impl PhotoView {
    pub fn new(user_id: Uuid, album_id: Uuid, record: &PhotoRecord) -> Self {
        Self {
            id: record.id,
            url: photo_url(user_id, album_id, &record.filename),
            caption: record.caption.clone(),
            uploaded_at: record.uploaded_at,
        }
    }
}

pub fn photo_url(user_id: Uuid, album_id: Uuid, filename: &str) -> String {
    format!("/uploads/{}/{}/{}", user_id, album_id, filename)
}

/// Trims the name and cuts it to [`MAX_NAME_CHARS`]. `None` when nothing is left.
pub fn normalize_name(raw: &str) -> Option<String> {
    let name: String = raw.trim().chars().take(MAX_NAME_CHARS).collect();
    if name.is_empty() { None } else { Some(name) }
}

pub(crate) fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && name != super::core::METADATA_FILE
}
