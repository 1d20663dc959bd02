use super::{
    documents::DocumentStore,
    error::StoreError,
    types::{Album, AlbumSummary, PhotoRecord, User, UserSummary, normalize_name},
};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

pub const USERS_FILE: &str = "users.json";
pub const ALBUMS_FILE: &str = "albums.json";
pub const METADATA_FILE: &str = "metadata.json";

/// Users, albums and photo records persisted as JSON lists under `root`:
///
/// ```text
/// root/users.json
/// root/{userId}/albums.json
/// root/{userId}/{albumId}/metadata.json
/// root/{userId}/{albumId}/{filename}
/// ```
///
/// User and album directories are created lazily the first time they are
/// read. When several documents are locked together the order is always
/// users, then albums, then photo metadata.
#[derive(Clone)]
pub struct MetadataStore {
    root: PathBuf,
    documents: DocumentStore,
}

impl MetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            documents: DocumentStore::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn users_file(&self) -> PathBuf {
        self.root.join(USERS_FILE)
    }

    pub fn user_dir(&self, user_id: Uuid) -> PathBuf {
        self.root.join(user_id.to_string())
    }

    pub fn albums_file(&self, user_id: Uuid) -> PathBuf {
        self.user_dir(user_id).join(ALBUMS_FILE)
    }

    pub fn album_dir(&self, user_id: Uuid, album_id: Uuid) -> PathBuf {
        self.user_dir(user_id).join(album_id.to_string())
    }

    pub fn metadata_file(&self, user_id: Uuid, album_id: Uuid) -> PathBuf {
        self.album_dir(user_id, album_id).join(METADATA_FILE)
    }

    /// Creates the storage root and an empty `users.json` when missing.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root).await?;
        self.documents.ensure(&self.users_file()).await
    }

    pub async fn ensure_user(&self, user_id: Uuid) -> Result<PathBuf, StoreError> {
        let dir = self.user_dir(user_id);
        tokio::fs::create_dir_all(&dir).await?;
        self.documents.ensure(&self.albums_file(user_id)).await?;
        Ok(dir)
    }

    pub async fn ensure_album(&self, user_id: Uuid, album_id: Uuid) -> Result<PathBuf, StoreError> {
        let dir = self.album_dir(user_id, album_id);
        tokio::fs::create_dir_all(&dir).await?;
        self.documents
            .ensure(&self.metadata_file(user_id, album_id))
            .await?;
        Ok(dir)
    }

    async fn read_users(&self) -> Result<Vec<User>, StoreError> {
        self.initialize().await?;
        self.documents.read(&self.users_file()).await
    }

    async fn read_albums(&self, user_id: Uuid) -> Result<Vec<Album>, StoreError> {
        self.ensure_user(user_id).await?;
        self.documents.read(&self.albums_file(user_id)).await
    }

    async fn read_photo_records(
        &self,
        user_id: Uuid,
        album_id: Uuid,
    ) -> Result<Vec<PhotoRecord>, StoreError> {
        self.ensure_album(user_id, album_id).await?;
        let path = self.metadata_file(user_id, album_id);
        let records: Vec<PhotoRecord> = self.documents.read(&path).await?;

        if let Some(bad) = records.iter().find(|r| !r.has_plain_filename()) {
            return Err(StoreError::InvalidRecord {
                document: path.display().to_string(),
                reason: format!("photo {} has filename {:?}", bad.id, bad.filename),
            });
        }

        Ok(records)
    }

    pub async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let users = self.read_users().await?;
        Ok(users.into_iter().find(|u| u.id == user_id))
    }

    /// Looks up an album, without creating directories for an unknown user.
    pub async fn find_album(
        &self,
        user_id: Uuid,
        album_id: Uuid,
    ) -> Result<Option<Album>, StoreError> {
        if self.find_user(user_id).await?.is_none() {
            return Ok(None);
        }
        let albums = self.read_albums(user_id).await?;
        Ok(albums.into_iter().find(|a| a.id == album_id))
    }

    async fn require_album(&self, user_id: Uuid, album_id: Uuid) -> Result<Album, StoreError> {
        self.find_album(user_id, album_id)
            .await?
            .ok_or_else(|| StoreError::NotFound("Album not found".to_string()))
    }

    pub async fn list_users(&self) -> Result<Vec<UserSummary>, StoreError> {
        let users = self.read_users().await?;

        let mut summaries = Vec::with_capacity(users.len());
        for user in users {
            let albums = self.read_albums(user.id).await?;
            summaries.push(UserSummary {
                id: user.id,
                name: user.name,
                album_count: albums.len(),
                created_at: user.created_at,
            });
        }

        Ok(summaries)
    }

    pub async fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let name = normalize_name(name)
            .ok_or_else(|| StoreError::Validation("User name required".to_string()))?;

        self.initialize().await?;
        let user = User {
            id: Uuid::new_v4(),
            name,
            created_at: Utc::now(),
        };

        let created = user.clone();
        self.documents
            .update(&self.users_file(), move |users: &mut Vec<User>| {
                users.insert(0, created);
                Ok(())
            })
            .await?;
        self.ensure_user(user.id).await?;

        Ok(user)
    }

    /// Removes a user that owns no albums. The user directory goes first and
    /// the list entry second; a failure in between leaves an entry whose
    /// directory is recreated empty on the next read.
    pub async fn delete_user(&self, user_id: Uuid) -> Result<User, StoreError> {
        self.initialize().await?;
        let users_doc = self.documents.lock::<User>(&self.users_file()).await;
        let mut users = users_doc.read().await?;

        let index = users
            .iter()
            .position(|u| u.id == user_id)
            .ok_or_else(|| StoreError::NotFound("User not found".to_string()))?;

        self.ensure_user(user_id).await?;
        let albums_doc = self.documents.lock::<Album>(&self.albums_file(user_id)).await;
        if !albums_doc.read().await?.is_empty() {
            return Err(StoreError::Conflict("User has albums".to_string()));
        }

        remove_tree(&self.user_dir(user_id)).await;
        let removed = users.remove(index);
        users_doc.write(&users).await?;

        Ok(removed)
    }

    /// Albums of a user with the number of photo records in each.
    pub async fn list_albums(&self, user_id: Uuid) -> Result<Vec<AlbumSummary>, StoreError> {
        if self.find_user(user_id).await?.is_none() {
            return Err(StoreError::NotFound("User not found".to_string()));
        }

        let albums = self.read_albums(user_id).await?;
        let mut summaries = Vec::with_capacity(albums.len());
        for album in albums {
            let records = self.read_photo_records(user_id, album.id).await?;
            summaries.push(AlbumSummary {
                id: album.id,
                name: album.name,
                count: records.len(),
                created_at: album.created_at,
            });
        }

        Ok(summaries)
    }

    pub async fn create_album(&self, user_id: Uuid, name: &str) -> Result<Album, StoreError> {
        self.initialize().await?;
        let users_doc = self.documents.lock::<User>(&self.users_file()).await;
        if !users_doc.read().await?.iter().any(|u| u.id == user_id) {
            return Err(StoreError::NotFound("User not found".to_string()));
        }

        let name = normalize_name(name)
            .ok_or_else(|| StoreError::Validation("Album name required".to_string()))?;

        let album = Album {
            id: Uuid::new_v4(),
            name,
            created_at: Utc::now(),
        };

        self.ensure_user(user_id).await?;
        let created = album.clone();
        self.documents
            .update(&self.albums_file(user_id), move |albums: &mut Vec<Album>| {
                albums.insert(0, created);
                Ok(())
            })
            .await?;
        self.ensure_album(user_id, album.id).await?;
        drop(users_doc);

        Ok(album)
    }

    /// Removes an album holding no photo records, directory first and list
    /// entry second, with the same gap as [`MetadataStore::delete_user`].
    pub async fn delete_album(&self, user_id: Uuid, album_id: Uuid) -> Result<Album, StoreError> {
        if self.find_user(user_id).await?.is_none() {
            return Err(StoreError::NotFound("Album not found".to_string()));
        }

        self.ensure_user(user_id).await?;
        let albums_doc = self.documents.lock::<Album>(&self.albums_file(user_id)).await;
        let mut albums = albums_doc.read().await?;

        let index = albums
            .iter()
            .position(|a| a.id == album_id)
            .ok_or_else(|| StoreError::NotFound("Album not found".to_string()))?;

        self.ensure_album(user_id, album_id).await?;
        let metadata_doc = self
            .documents
            .lock::<PhotoRecord>(&self.metadata_file(user_id, album_id))
            .await;
        if !metadata_doc.read().await?.is_empty() {
            return Err(StoreError::Conflict("Album is not empty".to_string()));
        }

        remove_tree(&self.album_dir(user_id, album_id)).await;
        let removed = albums.remove(index);
        albums_doc.write(&albums).await?;

        Ok(removed)
    }

    /// Photo records of an album whose image file is present on disk.
    /// Records without a file are skipped silently.
    pub async fn list_photos(
        &self,
        user_id: Uuid,
        album_id: Uuid,
    ) -> Result<Vec<PhotoRecord>, StoreError> {
        self.require_album(user_id, album_id).await?;

        let dir = self.album_dir(user_id, album_id);
        let records = self.read_photo_records(user_id, album_id).await?;

        let mut present = Vec::with_capacity(records.len());
        for record in records {
            if tokio::fs::try_exists(dir.join(&record.filename))
                .await
                .unwrap_or(false)
            {
                present.push(record);
            } else {
                debug!("Skipping photo {} without backing file", record.id);
            }
        }

        Ok(present)
    }

    /// Prepends a batch of records to the album in a single rewrite, so the
    /// last record of the batch ends up first in the list.
    pub async fn append_photos(
        &self,
        user_id: Uuid,
        album_id: Uuid,
        records: &[PhotoRecord],
    ) -> Result<(), StoreError> {
        let albums_doc = self.documents.lock::<Album>(&self.albums_file(user_id)).await;
        if !albums_doc.read().await?.iter().any(|a| a.id == album_id) {
            return Err(StoreError::NotFound("Album not found".to_string()));
        }

        self.ensure_album(user_id, album_id).await?;
        let batch = records.to_vec();
        self.documents
            .update(
                &self.metadata_file(user_id, album_id),
                move |existing: &mut Vec<PhotoRecord>| {
                    for record in batch {
                        existing.insert(0, record);
                    }
                    Ok(())
                },
            )
            .await?;
        drop(albums_doc);

        Ok(())
    }

    /// Unlinks the image and drops its record. A failed unlink is ignored.
    pub async fn delete_photo(
        &self,
        user_id: Uuid,
        album_id: Uuid,
        photo_id: Uuid,
    ) -> Result<PhotoRecord, StoreError> {
        self.require_album(user_id, album_id).await?;
        self.ensure_album(user_id, album_id).await?;

        let dir = self.album_dir(user_id, album_id);
        let metadata_doc = self
            .documents
            .lock::<PhotoRecord>(&self.metadata_file(user_id, album_id))
            .await;
        let mut records = metadata_doc.read().await?;

        let index = records
            .iter()
            .position(|r| r.id == photo_id)
            .ok_or_else(|| StoreError::NotFound("Not found".to_string()))?;

        let filename = &records[index].filename;
        if records[index].has_plain_filename() {
            if let Err(e) = tokio::fs::remove_file(dir.join(filename)).await {
                debug!("Ignoring unlink failure for {:?}: {}", filename, e);
            }
        } else {
            warn!("Not unlinking suspicious photo filename {:?}", filename);
        }

        let removed = records.remove(index);
        metadata_doc.write(&records).await?;

        Ok(removed)
    }
}

async fn remove_tree(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!("Removed {:?}", dir),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {:?}: {}", dir, e),
    }
}
