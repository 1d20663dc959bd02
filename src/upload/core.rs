use super::{
    error::UploadError,
    sniff::{self, ALLOWED_EXTENSIONS, SniffRejection},
    types::{StagedFile, UploadBatch, UploadTarget},
};
use crate::{
    UploadConfig,
    store::{MetadataStore, PhotoRecord, StoreError},
};
use std::path::{Path, PathBuf};
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Stages uploaded files, validates them by content and registers them in
/// the album in one metadata rewrite.
///
/// A batch is all or nothing for metadata. Files are not cleaned up as
/// thoroughly: when file N fails validation it is deleted, but files
/// 1..N-1 were already moved into place and stay on disk without records,
/// as do the staged files after N.
#[derive(Clone)]
pub struct UploadPipeline {
    store: MetadataStore,
    config: UploadConfig,
}

impl UploadPipeline {
    pub fn new(store: MetadataStore, config: UploadConfig) -> Self {
        Self { store, config }
    }

    /// Ensures the album exists and returns the directory files are staged in.
    pub async fn prepare(&self, user_id: Uuid, album_id: Uuid) -> Result<PathBuf, UploadError> {
        if self.store.find_album(user_id, album_id).await?.is_none() {
            return Err(StoreError::NotFound("Album not found".to_string()).into());
        }
        Ok(self.store.ensure_album(user_id, album_id).await?)
    }

    /// Opens the staged file for the next upload of a request, after the
    /// count limit and the declared content type check.
    pub async fn begin_file(
        &self,
        dir: &Path,
        original_name: &str,
        content_type: Option<&str>,
        already_staged: usize,
    ) -> Result<StagingFile, UploadError> {
        if already_staged >= self.config.max_files_per_request {
            return Err(UploadError::TooManyFiles {
                limit: self.config.max_files_per_request,
            });
        }

        if !sniff::declared_type_allowed(content_type) {
            return Err(UploadError::DeclaredType {
                filename: original_name.to_string(),
                content_type: content_type.map(str::to_string),
            });
        }

        let name = format!("{}.{}", Uuid::new_v4(), sniff::staged_extension(original_name));
        let path = dir.join(name);
        let file = File::create(&path).await?;
        debug!("Staging {:?} as {:?}", original_name, path);

        Ok(StagingFile {
            file,
            path,
            original_name: original_name.to_string(),
            written: 0,
            limit: self.config.max_file_size_bytes,
        })
    }

    /// Validates every staged file in order and commits their records.
    /// Returns the created records in upload order.
    pub async fn process(
        &self,
        target: &UploadTarget,
        batch: UploadBatch,
    ) -> Result<Vec<PhotoRecord>, UploadError> {
        if batch.files.is_empty() {
            return Err(UploadError::NoFiles);
        }

        let caption: String = batch
            .caption
            .chars()
            .take(self.config.max_caption_chars)
            .collect();

        let mut records = Vec::with_capacity(batch.files.len());
        for staged in &batch.files {
            let filename = self.validate(target, staged).await?;
            info!(
                ip = %target.client_ip,
                album_id = %target.album_id,
                saved = %filename,
                size = %sniff::format_bytes(staged.size),
                "Upload file stored"
            );
            records.push(PhotoRecord::new(filename, caption.clone()));
        }

        self.store
            .append_photos(target.user_id, target.album_id, &records)
            .await?;

        Ok(records)
    }

    /// Sniffs one staged file, deleting it on rejection, and moves it to a
    /// name carrying the sniffed extension when the staged one differs.
    async fn validate(
        &self,
        target: &UploadTarget,
        staged: &StagedFile,
    ) -> Result<String, UploadError> {
        let sniffed = match sniff::sniff_file(&staged.path).await {
            Ok(sniffed) => sniffed,
            Err(rejection) => {
                discard(&staged.path).await;
                return Err(match rejection {
                    SniffRejection::NotImage => {
                        warn!(
                            ip = %target.client_ip,
                            album_id = %target.album_id,
                            file = %staged.original_name,
                            reason = "not_image",
                            "Upload rejected"
                        );
                        UploadError::NotImage {
                            filename: staged.original_name.clone(),
                        }
                    }
                    SniffRejection::Unsupported { mime } => {
                        warn!(
                            ip = %target.client_ip,
                            album_id = %target.album_id,
                            file = %staged.original_name,
                            mime = %mime,
                            reason = "unsupported_type",
                            "Upload rejected"
                        );
                        UploadError::UnsupportedType {
                            filename: staged.original_name.clone(),
                            mime,
                            allowed: ALLOWED_EXTENSIONS.join(", "),
                        }
                    }
                });
            }
        };

        debug!("Sniffed {:?} as {}", staged.original_name, sniffed.mime);

        if sniff::extension_of(&staged.path) == sniffed.extension {
            return Ok(file_name(&staged.path));
        }

        let renamed = staged
            .path
            .with_file_name(format!("{}.{}", Uuid::new_v4(), sniffed.extension));
        tokio::fs::rename(&staged.path, &renamed).await?;
        debug!("Renamed {:?} to {:?}", staged.path, renamed);

        Ok(file_name(&renamed))
    }
}

/// Open handle on a file being streamed into the album directory.
pub struct StagingFile {
    file: File,
    path: PathBuf,
    original_name: String,
    written: u64,
    limit: u64,
}

impl StagingFile {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        self.written += chunk.len() as u64;
        if self.written > self.limit {
            return Err(UploadError::FileTooLarge {
                filename: self.original_name.clone(),
                limit: self.limit,
            });
        }

        self.file.write_all(chunk).await?;
        Ok(())
    }

    /// Flushes the staged bytes to disk. The partial file is removed when
    /// that fails.
    pub async fn finish(mut self) -> Result<StagedFile, UploadError> {
        let synced = async {
            self.file.flush().await?;
            self.file.sync_all().await
        }
        .await;
        if let Err(e) = synced {
            self.discard().await;
            return Err(e.into());
        }

        Ok(StagedFile {
            original_name: self.original_name,
            path: self.path,
            size: self.written,
        })
    }

    /// Closes and deletes the partial file.
    pub async fn discard(self) {
        drop(self.file);
        discard(&self.path).await;
    }
}

/// Deletes staged files, ignoring failures.
pub async fn discard_all(files: &[StagedFile]) {
    for file in files {
        discard(&file.path).await;
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!("Ignoring failure to remove {:?}: {}", path, e);
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_failed_finish_removes_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("partial.png");
        std::fs::write(&path, b"partial").unwrap();

        // Every write to /dev/full fails once it reaches the device
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open("/dev/full")
            .await
            .unwrap();
        let mut staging = StagingFile {
            file,
            path: path.clone(),
            original_name: "partial.png".to_string(),
            written: 0,
            limit: 1024,
        };

        staging.write_chunk(b"image bytes").await.unwrap();
        let err = staging.finish().await.unwrap_err();
        assert!(matches!(err, UploadError::Io(_)));
        assert!(!path.exists());
    }
}
