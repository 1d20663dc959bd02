use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No files uploaded")]
    NoFiles,

    #[error("Too many files (limit {limit})")]
    TooManyFiles { limit: usize },

    #[error("File too large: {filename} (limit {limit} bytes)")]
    FileTooLarge { filename: String, limit: u64 },

    #[error("Only image files are allowed (jpeg/png/webp/gif/heic). Rejected: {filename}")]
    DeclaredType {
        filename: String,
        content_type: Option<String>,
    },

    #[error("Only image files are allowed. Rejected: {filename}")]
    NotImage { filename: String },

    #[error("Unsupported image type ({mime}) in {filename}. Allowed: {allowed}")]
    UnsupportedType {
        filename: String,
        mime: String,
        allowed: String,
    },

    #[error("Malformed upload: {0}")]
    Multipart(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Whether the client caused the failure, as opposed to the server.
    pub fn is_client_error(&self) -> bool {
        match self {
            UploadError::Store(e) => !matches!(
                e,
                StoreError::Io(_) | StoreError::Serialization(_) | StoreError::InvalidRecord { .. }
            ),
            UploadError::Io(_) => false,
            _ => true,
        }
    }
}
