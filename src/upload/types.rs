use std::path::PathBuf;

/// A file written to the album directory but not validated yet.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub original_name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Everything received for one upload request.
#[derive(Debug, Clone, Default)]
pub struct UploadBatch {
    pub files: Vec<StagedFile>,
    pub caption: String,
}

impl UploadBatch {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Album an upload request is bound for, plus who sent it.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub user_id: uuid::Uuid,
    pub album_id: uuid::Uuid,
    pub client_ip: String,
}
