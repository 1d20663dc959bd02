#[cfg(test)]
mod tests {
    use super::super::*;
    use std::fs;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn setup_store() -> (TempDir, MetadataStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path().join("uploads"));
        (temp_dir, store)
    }

    async fn add_photo(store: &MetadataStore, user_id: Uuid, album_id: Uuid, caption: &str) -> PhotoRecord {
        let dir = store.ensure_album(user_id, album_id).await.unwrap();
        let record = PhotoRecord::new(format!("{}.png", Uuid::new_v4()), caption.to_string());
        fs::write(dir.join(&record.filename), b"png bytes").unwrap();
        store
            .append_photos(user_id, album_id, std::slice::from_ref(&record))
            .await
            .unwrap();
        record
    }

    #[tokio::test]
    async fn test_create_user_trims_and_truncates_name() {
        let (_temp, store) = setup_store();

        let user = store.create_user("   Alice   ").await.unwrap();
        assert_eq!(user.name, "Alice");

        let long = "x".repeat(100);
        let user = store.create_user(&long).await.unwrap();
        assert_eq!(user.name.chars().count(), MAX_NAME_CHARS);

        let users = store.list_users().await.unwrap();
        assert_eq!(users.len(), 2);
        // Newest first
        assert_eq!(users[0].id, user.id);
        assert!(store.user_dir(user.id).join(ALBUMS_FILE).exists());
    }

    #[tokio::test]
    async fn test_create_user_rejects_blank_names() {
        let (_temp, store) = setup_store();

        for name in ["", "   ", "\t\n"] {
            let result = store.create_user(name).await;
            assert!(matches!(result, Err(StoreError::Validation(_))), "{:?}", name);
        }
        assert!(store.list_users().await.unwrap().is_empty());
    }

    #[test]
    fn test_normalize_name_counts_characters() {
        let name = "é".repeat(70);
        let normalized = normalize_name(&name).unwrap();
        assert_eq!(normalized.chars().count(), 60);
        assert_eq!(normalize_name("  "), None);
    }

    #[tokio::test]
    async fn test_delete_user_with_albums_conflicts() {
        let (_temp, store) = setup_store();
        let user = store.create_user("Alice").await.unwrap();
        let album = store.create_album(user.id, "Trip").await.unwrap();

        let result = store.delete_user(user.id).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert!(store.user_dir(user.id).exists());

        store.delete_album(user.id, album.id).await.unwrap();
        let removed = store.delete_user(user.id).await.unwrap();
        assert_eq!(removed.id, user.id);
        assert!(!store.user_dir(user.id).exists());
        assert!(store.list_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_user_is_not_found() {
        let (_temp, store) = setup_store();
        let result = store.delete_user(Uuid::new_v4()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_album_operations_require_user() {
        let (_temp, store) = setup_store();
        let ghost = Uuid::new_v4();

        assert!(matches!(
            store.list_albums(ghost).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.create_album(ghost, "Trip").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_album(ghost, Uuid::new_v4()).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(!store.user_dir(ghost).exists());
    }

    #[tokio::test]
    async fn test_create_album_rejects_blank_name() {
        let (_temp, store) = setup_store();
        let user = store.create_user("Alice").await.unwrap();

        let result = store.create_album(user.id, "  ").await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert!(store.list_albums(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_album_with_photos_conflicts() {
        let (_temp, store) = setup_store();
        let user = store.create_user("Alice").await.unwrap();
        let album = store.create_album(user.id, "Trip").await.unwrap();
        let photo = add_photo(&store, user.id, album.id, "Sunset").await;

        let albums = store.list_albums(user.id).await.unwrap();
        assert_eq!(albums[0].count, 1);

        let result = store.delete_album(user.id, album.id).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        store.delete_photo(user.id, album.id, photo.id).await.unwrap();
        store.delete_album(user.id, album.id).await.unwrap();
        assert!(!store.album_dir(user.id, album.id).exists());
        assert_eq!(store.list_users().await.unwrap()[0].album_count, 0);
    }

    #[tokio::test]
    async fn test_list_photos_skips_missing_files() {
        let (_temp, store) = setup_store();
        let user = store.create_user("Alice").await.unwrap();
        let album = store.create_album(user.id, "Trip").await.unwrap();

        let kept = add_photo(&store, user.id, album.id, "kept").await;
        let lost = add_photo(&store, user.id, album.id, "lost").await;
        fs::remove_file(store.album_dir(user.id, album.id).join(&lost.filename)).unwrap();

        let photos = store.list_photos(user.id, album.id).await.unwrap();
        assert_eq!(photos, vec![kept]);

        // The orphaned record still counts towards the album
        let albums = store.list_albums(user.id).await.unwrap();
        assert_eq!(albums[0].count, 2);
    }

    #[tokio::test]
    async fn test_append_photos_prepends_in_reverse_order() {
        let (_temp, store) = setup_store();
        let user = store.create_user("Alice").await.unwrap();
        let album = store.create_album(user.id, "Trip").await.unwrap();
        let dir = store.ensure_album(user.id, album.id).await.unwrap();

        let batch: Vec<PhotoRecord> = (0..3)
            .map(|i| PhotoRecord::new(format!("{}.jpg", i), String::new()))
            .collect();
        for record in &batch {
            fs::write(dir.join(&record.filename), b"x").unwrap();
        }
        store.append_photos(user.id, album.id, &batch).await.unwrap();

        let names: Vec<_> = store
            .list_photos(user.id, album.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.filename)
            .collect();
        assert_eq!(names, vec!["2.jpg", "1.jpg", "0.jpg"]);
    }

    #[tokio::test]
    async fn test_delete_photo_tolerates_missing_file() {
        let (_temp, store) = setup_store();
        let user = store.create_user("Alice").await.unwrap();
        let album = store.create_album(user.id, "Trip").await.unwrap();
        let photo = add_photo(&store, user.id, album.id, "gone").await;
        fs::remove_file(store.album_dir(user.id, album.id).join(&photo.filename)).unwrap();

        let removed = store.delete_photo(user.id, album.id, photo.id).await.unwrap();
        assert_eq!(removed.id, photo.id);

        let again = store.delete_photo(user.id, album.id, photo.id).await;
        assert!(matches!(again, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_dangling_user_directory_is_recreated() {
        let (_temp, store) = setup_store();
        let user = store.create_user("Alice").await.unwrap();
        fs::remove_dir_all(store.user_dir(user.id)).unwrap();

        let users = store.list_users().await.unwrap();
        assert_eq!(users[0].album_count, 0);
        assert!(store.albums_file(user.id).exists());
    }

    #[tokio::test]
    async fn test_reads_are_repeatable() {
        let (_temp, store) = setup_store();
        let user = store.create_user("Alice").await.unwrap();
        let album = store.create_album(user.id, "Trip").await.unwrap();
        add_photo(&store, user.id, album.id, "Sunset").await;

        assert_eq!(store.list_users().await.unwrap(), store.list_users().await.unwrap());
        assert_eq!(
            store.list_albums(user.id).await.unwrap(),
            store.list_albums(user.id).await.unwrap()
        );
        assert_eq!(
            store.list_photos(user.id, album.id).await.unwrap(),
            store.list_photos(user.id, album.id).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_records_with_path_filenames_are_rejected() {
        let (_temp, store) = setup_store();
        let user = store.create_user("Alice").await.unwrap();
        let album = store.create_album(user.id, "Trip").await.unwrap();

        let bad = PhotoRecord::new("../../users.json".to_string(), String::new());
        let json = serde_json::to_string(&vec![bad]).unwrap();
        fs::write(store.metadata_file(user.id, album.id), json).unwrap();

        let result = store.list_photos(user.id, album.id).await;
        assert!(matches!(result, Err(StoreError::InvalidRecord { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_album_creation_keeps_every_album() {
        let (_temp, store) = setup_store();
        let user = store.create_user("Alice").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create_album(user.id, &format!("Album {}", i)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.list_albums(user.id).await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_reads_legacy_documents() {
        let (_temp, store) = setup_store();
        store.initialize().await.unwrap();

        let id = Uuid::new_v4();
        let legacy = format!(
            r#"[{{"id":"{}","name":"Bob","createdAt":"2024-05-01T10:00:00.000Z"}}]"#,
            id
        );
        fs::write(store.users_file(), legacy).unwrap();

        let users = store.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "Bob");
        assert_eq!(users[0].id, id);
    }
}
