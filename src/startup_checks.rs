use crate::{Config, store::MetadataStore};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum StartupCheckError {
    #[error("Failed to prepare storage directory: {0}")]
    StorageInitializationFailed(#[from] crate::store::StoreError),

    #[error("Public directory does not exist: {0}")]
    PublicDirectoryMissing(String),
}

impl StartupCheckError {
    /// Whether the server cannot run with this error.
    pub fn is_critical(&self) -> bool {
        matches!(self, StartupCheckError::StorageInitializationFailed(_))
    }
}

pub async fn perform_startup_checks(config: &Config) -> Result<(), Vec<StartupCheckError>> {
    let mut errors = Vec::new();

    info!("Performing startup checks...");

    let uploads_dir = &config.storage.uploads_directory;
    let store = MetadataStore::new(uploads_dir.clone());
    match store.initialize().await {
        Ok(()) => info!("Storage directory ready: {:?}", uploads_dir),
        Err(e) => {
            error!("Failed to prepare storage directory {:?}: {}", uploads_dir, e);
            errors.push(StartupCheckError::StorageInitializationFailed(e));
        }
    }

    let public_dir = &config.storage.public_directory;
    if !public_dir.exists() {
        warn!("Public directory does not exist: {:?}", public_dir);
        warn!("The client application will not be served");
        errors.push(StartupCheckError::PublicDirectoryMissing(
            public_dir.display().to_string(),
        ));
    } else if !public_dir.join("index.html").exists() {
        warn!("Public directory has no index.html: {:?}", public_dir);
    } else {
        info!("Public directory exists: {:?}", public_dir);
    }

    if errors.is_empty() {
        info!("All startup checks passed");
        Ok(())
    } else {
        error!("Startup checks failed with {} errors", errors.len());
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_creates_storage_and_flags_missing_public_dir() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.uploads_directory = temp_dir.path().join("uploads");
        config.storage.public_directory = temp_dir.path().join("public");

        let errors = perform_startup_checks(&config).await.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(!errors[0].is_critical());

        let users = std::fs::read_to_string(temp_dir.path().join("uploads/users.json")).unwrap();
        assert_eq!(users, "[]");

        std::fs::create_dir_all(&config.storage.public_directory).unwrap();
        assert!(perform_startup_checks(&config).await.is_ok());
    }
}
