use super::error::StoreError;
use serde::{Serialize, de::DeserializeOwned};
use std::{
    collections::HashMap,
    io::ErrorKind,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    io::AsyncWriteExt,
    sync::{Mutex, OwnedMutexGuard},
};
use tracing::debug;
use uuid::Uuid;

/// JSON array documents on disk, one per list.
///
/// Every document path owns a mutex. Read-modify-write sequences go through
/// [`DocumentStore::lock`] or [`DocumentStore::update`] so concurrent requests
/// touching the same list are applied one after another. Writes land in a
/// sibling temp file that is renamed over the target, which lets unlocked
/// readers always see a whole document.
#[derive(Clone, Default)]
pub struct DocumentStore {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to the document at `path`. The lock is
    /// released when the returned handle is dropped, including on error paths.
    pub async fn lock<T>(&self, path: &Path) -> LockedDocument<T> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(path.to_path_buf()).or_default().clone()
        };

        LockedDocument {
            path: path.to_path_buf(),
            _guard: lock.lock_owned().await,
            _marker: PhantomData,
        }
    }

    /// Snapshot read without taking the document lock.
    pub async fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>, StoreError> {
        read_document(path).await
    }

    /// Read-modify-write under the document lock. The document is only
    /// rewritten when `apply` succeeds.
    pub async fn update<T, R, F>(&self, path: &Path, apply: F) -> Result<R, StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Vec<T>) -> Result<R, StoreError>,
    {
        let document = self.lock::<T>(path).await;
        let mut items = document.read().await?;
        let result = apply(&mut items)?;
        document.write(&items).await?;
        Ok(result)
    }

    /// Creates `path` holding an empty array unless it already exists.
    pub async fn ensure(&self, path: &Path) -> Result<(), StoreError> {
        let created = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await;

        match created {
            Ok(mut file) => {
                file.write_all(b"[]").await?;
                file.flush().await?;
                debug!("Created empty document {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Exclusive handle on one document, obtained from [`DocumentStore::lock`].
pub struct LockedDocument<T> {
    path: PathBuf,
    _guard: OwnedMutexGuard<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> LockedDocument<T> {
    pub async fn read(&self) -> Result<Vec<T>, StoreError> {
        read_document(&self.path).await
    }

    pub async fn write(&self, items: &[T]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(items)?;

        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("document");
        let temp_path = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        tokio::fs::write(&temp_path, json).await?;
        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }
}

async fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let contents = tokio::fs::read_to_string(path).await?;

    // A document created by `ensure` can be observed before its bytes land.
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }

    Ok(serde_json::from_str(&contents)?)
}
