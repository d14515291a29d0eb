//! File-entry service: folder creation, uploads, rename, delete and
//! downloads on top of [`TreeStore`] and a [`BlobStore`].
//!
//! Tree mutations run inside [`TreeStore::begin_write`] transactions so the
//! parent-exists and name-is-free checks see the same state the insert
//! does. Blob I/O never happens inside those transactions: uploads store
//! the bytes first, deletes remove them after the commit.

use crate::{
    models::{
        entry::{Entry, NewEntry},
        metadata::FileMetadata,
        principal::Principal,
    },
    services::{
        access::{AccessResolver, AccessRoute},
        blob_store::{BlobError, BlobStore, SIGNED_URL_TTL},
        file_error::{FileError, FileResult},
        share_service::ShareEngine,
        tree_store::{DeletedTree, Scope, TreeStore},
    },
    validation::{FILE_FORM, FOLDER_FORM, Schema},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const DEFAULT_ENCODING: &str = "7bit";

/// Content received for a new file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub original_name: String,
    pub mime_type: String,
    pub encoding: String,
    pub bytes: Bytes,
}

/// An entry with what a listing page shows around it.
#[derive(Debug, Clone)]
pub struct EntryView {
    pub entry: Entry,
    pub ancestors: Vec<Entry>,
    pub children: Vec<Entry>,
}

#[derive(Debug, Clone)]
pub struct DownloadLink {
    pub url: String,
    pub filename: String,
}

#[derive(Clone)]
pub struct FileService {
    store: TreeStore,
    shares: ShareEngine,
    access: AccessResolver,
    blobs: Arc<dyn BlobStore>,
    max_file_size: u64,
}

impl FileService {
    pub fn new(pool: SqlitePool, blobs: Arc<dyn BlobStore>, max_file_size: u64) -> Self {
        let store = TreeStore::new(pool);
        let shares = ShareEngine::new(store.clone());
        let access = AccessResolver::new(store.clone(), shares.clone());
        Self {
            store,
            shares,
            access,
            blobs,
            max_file_size,
        }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub async fn list_root(&self, owner_id: Uuid) -> FileResult<Vec<Entry>> {
        self.access.list_root(owner_id).await
    }

    /// Resolve `id` for `route` and list its children.
    pub async fn view(&self, route: AccessRoute, id: Uuid) -> FileResult<EntryView> {
        let resolved = self.access.resolve(route, id).await?;
        let children = self.access.list_children(route, &resolved).await?;
        Ok(EntryView {
            entry: resolved.entry,
            ancestors: resolved.ancestors,
            children,
        })
    }

    /// Resolve `id` for `route` without listing children.
    pub async fn find(&self, route: AccessRoute, id: Uuid) -> FileResult<Entry> {
        Ok(self.access.resolve(route, id).await?.entry)
    }

    /// The owner's folder `id`, for forms that create entries inside it.
    pub async fn owned_folder(&self, owner_id: Uuid, id: Uuid) -> FileResult<Entry> {
        let mut conn = self.store.acquire().await?;
        self.writable_parent(&mut conn, owner_id, Some(id))
            .await?
            .ok_or(FileError::ParentNotFound)
    }

    pub async fn create_folder(
        &self,
        owner_id: Uuid,
        parent_id: Option<Uuid>,
        name: &str,
    ) -> FileResult<Entry> {
        let name = checked_name(&FOLDER_FORM, name)?;

        let mut tx = self.store.begin_write(owner_id).await?;
        let parent = self.writable_parent(&mut tx, owner_id, parent_id).await?;
        self.ensure_root_name_free(&mut tx, owner_id, parent.as_ref(), name, None)
            .await?;

        let new_entry = NewEntry::folder(owner_id, name)
            .with_parent(parent_id)
            .inheriting_share(parent.as_ref(), Utc::now());
        let entry = self.store.create(&mut tx, &new_entry).await?;
        tx.commit().await?;

        info!(entry_id = %entry.id, owner_id = %owner_id, "created folder {}", entry.name);
        Ok(entry)
    }

    /// Store `upload` and record it as a file named `name`, falling back to
    /// the uploaded filename.
    pub async fn upload_file(
        &self,
        principal: &Principal,
        parent_id: Option<Uuid>,
        name: Option<&str>,
        upload: Upload,
    ) -> FileResult<Entry> {
        let owner_id = principal.id;
        let name = name
            .filter(|n| !n.is_empty())
            .unwrap_or(&upload.original_name)
            .to_string();

        let size = upload.bytes.len() as u64;
        if size > self.max_file_size {
            return Err(FileError::SizeLimitExceeded {
                limit: self.max_file_size,
                actual: size,
            });
        }
        let name = checked_name(&FILE_FORM, &name)?.to_string();

        // Cheap pre-check so common failures do not leave orphaned blobs.
        {
            let mut conn = self.store.acquire().await?;
            let parent = self.writable_parent(&mut conn, owner_id, parent_id).await?;
            self.ensure_root_name_free(&mut conn, owner_id, parent.as_ref(), &name, None)
                .await?;
        }

        let storage_path = self
            .blobs
            .put(
                &principal.username,
                owner_id,
                &upload.original_name,
                upload.bytes,
                &upload.mime_type,
            )
            .await?;

        let metadata = FileMetadata {
            encoding: upload.encoding,
            mime_type: upload.mime_type,
            size_bytes: size as i64,
            storage_path,
        };
        let stored_at = metadata.storage_path.clone();

        let created = self
            .insert_file(owner_id, parent_id, &name, metadata)
            .await;
        match created {
            Ok(entry) => {
                info!(
                    entry_id = %entry.id,
                    owner_id = %owner_id,
                    size,
                    "uploaded file {}",
                    entry.name
                );
                Ok(entry)
            }
            Err(err) => {
                warn!("blob {} orphaned after failed insert: {}", stored_at, err);
                Err(err)
            }
        }
    }

    async fn insert_file(
        &self,
        owner_id: Uuid,
        parent_id: Option<Uuid>,
        name: &str,
        metadata: FileMetadata,
    ) -> FileResult<Entry> {
        let mut tx = self.store.begin_write(owner_id).await?;
        let parent = self.writable_parent(&mut tx, owner_id, parent_id).await?;
        self.ensure_root_name_free(&mut tx, owner_id, parent.as_ref(), name, None)
            .await?;

        let new_entry = NewEntry::file(owner_id, name, metadata)
            .with_parent(parent_id)
            .inheriting_share(parent.as_ref(), Utc::now());
        let entry = self.store.create(&mut tx, &new_entry).await?;
        tx.commit().await?;
        Ok(entry)
    }

    pub async fn rename(&self, owner_id: Uuid, id: Uuid, new_name: &str) -> FileResult<Entry> {
        let mut tx = self.store.begin_write(owner_id).await?;
        let entry = self
            .store
            .find_by_id(&mut tx, id, Scope::Owner(owner_id))
            .await?
            .ok_or(FileError::NotFound)?;

        let schema = if entry.is_dir { &FOLDER_FORM } else { &FILE_FORM };
        let new_name = checked_name(schema, new_name)?;

        if entry.parent_id.is_none()
            && self
                .store
                .root_name_taken(&mut tx, owner_id, new_name, Some(id))
                .await?
        {
            return Err(FileError::Conflict(new_name.to_string()));
        }
        self.store.rename(&mut tx, id, owner_id, new_name).await?;
        tx.commit().await?;

        info!(entry_id = %id, "renamed {} to {}", entry.name, new_name);
        Ok(Entry {
            name: new_name.to_string(),
            ..entry
        })
    }

    /// Remove `id` and its subtree, then the blobs of every removed file.
    ///
    /// Rows are gone once this returns, even on `StorageFailure`: blob
    /// removal runs after the commit and is not rolled back.
    pub async fn delete(&self, owner_id: Uuid, id: Uuid) -> FileResult<DeletedTree> {
        let mut tx = self.store.begin_write(owner_id).await?;
        let deleted = self.store.delete(&mut tx, id, owner_id).await?;
        tx.commit().await?;

        let mut failure: Option<BlobError> = None;
        for path in &deleted.blob_paths {
            if let Err(err) = self.blobs.remove(path).await {
                error!("failed to remove blob {}: {}", path, err);
                failure.get_or_insert(err);
            }
        }

        info!(
            entry_id = %id,
            removed = deleted.removed,
            blobs = deleted.blob_paths.len(),
            "deleted {}",
            deleted.root.name
        );
        match failure {
            Some(err) => Err(FileError::StorageFailure(err)),
            None => Ok(deleted),
        }
    }

    /// A short-lived download URL for the file `id`.
    pub async fn download(&self, route: AccessRoute, id: Uuid) -> FileResult<DownloadLink> {
        let entry = self.access.resolve(route, id).await?.entry;
        let metadata = entry
            .metadata
            .as_ref()
            .filter(|_| !entry.is_dir)
            .ok_or(FileError::NotFound)?;

        let filename = entry.download_name();
        let url = self
            .blobs
            .signed_url(
                &metadata.storage_path,
                SIGNED_URL_TTL,
                &filename,
                &metadata.mime_type,
            )
            .await?;
        Ok(DownloadLink { url, filename })
    }

    pub async fn share(&self, owner_id: Uuid, id: Uuid, days: i64) -> FileResult<DateTime<Utc>> {
        self.shares.share_subtree(id, owner_id, days).await
    }

    pub async fn unshare(&self, owner_id: Uuid, id: Uuid) -> FileResult<()> {
        self.shares.unshare_subtree(id, owner_id).await
    }

    /// The owned folder `parent_id`, or `None` at the root level.
    async fn writable_parent(
        &self,
        conn: &mut SqliteConnection,
        owner_id: Uuid,
        parent_id: Option<Uuid>,
    ) -> FileResult<Option<Entry>> {
        let Some(parent_id) = parent_id else {
            return Ok(None);
        };
        self.store
            .find_by_id(conn, parent_id, Scope::Owner(owner_id))
            .await?
            .filter(|p| p.is_dir)
            .map(Some)
            .ok_or(FileError::ParentNotFound)
    }

    async fn ensure_root_name_free(
        &self,
        conn: &mut SqliteConnection,
        owner_id: Uuid,
        parent: Option<&Entry>,
        name: &str,
        except: Option<Uuid>,
    ) -> FileResult<()> {
        if parent.is_none() && self.store.root_name_taken(conn, owner_id, name, except).await? {
            return Err(FileError::Conflict(name.to_string()));
        }
        Ok(())
    }
}

/// Validate `name` and return it as stored, without trailing whitespace.
fn checked_name<'a>(schema: &Schema, name: &'a str) -> FileResult<&'a str> {
    schema
        .validate(&[("name", Some(name))])
        .map_err(FileError::ValidationFailed)?;
    Ok(name.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::{blob_store::BlobResult, database::Database},
        test_support::{TestHarness, principal},
    };
    use async_trait::async_trait;
    use chrono::Duration;
    use std::{io, time::Duration as StdDuration};

    fn upload(name: &str, body: &'static [u8]) -> Upload {
        Upload {
            original_name: name.into(),
            mime_type: "text/plain".into(),
            encoding: DEFAULT_ENCODING.into(),
            bytes: Bytes::from_static(body),
        }
    }

    /// Accepts nothing.
    struct BrokenBlobStore;

    #[async_trait]
    impl BlobStore for BrokenBlobStore {
        async fn put(&self, _: &str, _: Uuid, _: &str, _: Bytes, _: &str) -> BlobResult<String> {
            Err(BlobError::Io(io::Error::other("disk on fire")))
        }
        async fn remove(&self, _: &str) -> BlobResult<()> {
            Err(BlobError::Io(io::Error::other("disk on fire")))
        }
        async fn signed_url(
            &self,
            _: &str,
            _: StdDuration,
            _: &str,
            _: &str,
        ) -> BlobResult<String> {
            Err(BlobError::Io(io::Error::other("disk on fire")))
        }
        async fn health_check(&self) -> BlobResult<()> {
            Err(BlobError::Io(io::Error::other("disk on fire")))
        }
    }

    async fn count_entries(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_folder_at_root_and_nested() {
        let h = TestHarness::new().await;
        let owner = h.user.id;

        let docs = h.files.create_folder(owner, None, "Docs").await.unwrap();
        assert!(docs.is_dir);
        assert_eq!(docs.parent_id, None);
        assert!(!docs.is_shared);

        let reports = h.files.create_folder(owner, Some(docs.id), "Reports").await.unwrap();
        assert_eq!(reports.parent_id, Some(docs.id));

        let view = h.files.view(AccessRoute::Owned(owner), docs.id).await.unwrap();
        assert_eq!(view.children.len(), 1);
        assert_eq!(view.children[0].id, reports.id);
    }

    #[tokio::test]
    async fn test_duplicate_names_conflict() {
        let h = TestHarness::new().await;
        let owner = h.user.id;
        let docs = h.files.create_folder(owner, None, "Docs").await.unwrap();
        h.files.create_folder(owner, Some(docs.id), "Reports").await.unwrap();

        let err = h.files.create_folder(owner, None, "Docs").await.unwrap_err();
        assert!(matches!(err, FileError::Conflict(name) if name == "Docs"));
        let err = h
            .files
            .create_folder(owner, Some(docs.id), "Reports")
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::Conflict(_)));

        // Same name under a different parent, or for a different user, is fine.
        h.files.create_folder(owner, Some(docs.id), "Docs").await.unwrap();
        h.files.create_folder(Uuid::new_v4(), None, "Docs").await.unwrap();
    }

    #[tokio::test]
    async fn test_create_folder_rejects_bad_input() {
        let h = TestHarness::new().await;
        let owner = h.user.id;

        let err = h.files.create_folder(owner, None, "").await.unwrap_err();
        assert!(matches!(err, FileError::ValidationFailed(ref f) if f.contains_key("name")));
        let err = h
            .files
            .create_folder(owner, None, &"x".repeat(101))
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::ValidationFailed(_)));

        let err = h
            .files
            .create_folder(owner, Some(Uuid::new_v4()), "Orphan")
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::ParentNotFound));

        // Another user's folder is not a valid parent either.
        let theirs = h.files.create_folder(Uuid::new_v4(), None, "Theirs").await.unwrap();
        let err = h
            .files
            .create_folder(owner, Some(theirs.id), "Sneaky")
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::ParentNotFound));
    }

    #[tokio::test]
    async fn test_trailing_whitespace_is_not_stored() {
        let h = TestHarness::new().await;
        let owner = h.user.id;
        let longest = "a".repeat(100);

        let folder = h
            .files
            .create_folder(owner, None, &format!("{longest} "))
            .await
            .unwrap();
        assert_eq!(folder.name, longest);

        // Same name once trimmed.
        let err = h
            .files
            .create_folder(owner, None, &format!("{longest}\t"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::Conflict(_)));

        let err = h.files.create_folder(owner, None, "   ").await.unwrap_err();
        assert!(matches!(err, FileError::ValidationFailed(_)));
        let err = h
            .files
            .create_folder(owner, None, &format!("{longest}b "))
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::ValidationFailed(_)));

        let renamed = h
            .files
            .rename(owner, folder.id, &format!("{} \n", "b".repeat(100)))
            .await
            .unwrap();
        assert_eq!(renamed.name, "b".repeat(100));

        let file_name = format!("{}.txt  ", "c".repeat(96));
        let file = h
            .files
            .upload_file(&h.user, None, Some(file_name.as_str()), upload("n.txt", b"x"))
            .await
            .unwrap();
        assert_eq!(file.name, file_name.trim_end());
    }

    #[tokio::test]
    async fn test_file_is_not_a_parent() {
        let h = TestHarness::new().await;
        let file = h
            .files
            .upload_file(&h.user, None, None, upload("a.txt", b"data"))
            .await
            .unwrap();
        let err = h
            .files
            .create_folder(h.user.id, Some(file.id), "Inside")
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::ParentNotFound));
    }

    #[tokio::test]
    async fn test_upload_records_metadata() {
        let h = TestHarness::new().await;
        let file = h
            .files
            .upload_file(&h.user, None, Some("notes"), upload("notes.txt", b"hello"))
            .await
            .unwrap();

        assert!(!file.is_dir);
        assert_eq!(file.name, "notes");
        let meta = file.metadata.as_ref().unwrap();
        assert_eq!(meta.size_bytes, 5);
        assert_eq!(meta.mime_type, "text/plain");
        assert_eq!(meta.encoding, "7bit");
        assert!(
            meta.storage_path
                .starts_with(&format!("uploads/{}/{}_", h.user.username, h.user.id))
        );
        assert!(meta.storage_path.ends_with(".txt"));
        assert_eq!(file.download_name(), "notes.txt");

        let on_disk = h.blobs.physical_path(&meta.storage_path);
        assert_eq!(tokio::fs::read(on_disk).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_upload_name_defaults_to_filename() {
        let h = TestHarness::new().await;
        let file = h
            .files
            .upload_file(&h.user, None, Some(""), upload("report.pdf", b"%PDF"))
            .await
            .unwrap();
        assert_eq!(file.name, "report.pdf");
    }

    #[tokio::test]
    async fn test_upload_size_limit() {
        let h = TestHarness::with_limit(4).await;
        h.files
            .upload_file(&h.user, None, None, upload("four.txt", b"1234"))
            .await
            .unwrap();
        let err = h
            .files
            .upload_file(&h.user, None, None, upload("five.txt", b"12345"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FileError::SizeLimitExceeded { limit: 4, actual: 5 }
        ));
        assert_eq!(count_entries(&h.db).await, 1);
    }

    #[tokio::test]
    async fn test_upload_storage_failure_creates_nothing() {
        let db = Database::open_in_memory().await.unwrap();
        let files = FileService::new(db.pool().clone(), Arc::new(BrokenBlobStore), 1024);
        let err = files
            .upload_file(&principal(), None, None, upload("a.txt", b"a"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::StorageFailure(_)));
        assert_eq!(count_entries(&db).await, 0);
    }

    #[tokio::test]
    async fn test_rename() {
        let h = TestHarness::new().await;
        let owner = h.user.id;
        let docs = h.files.create_folder(owner, None, "Docs").await.unwrap();
        h.files.create_folder(owner, None, "Archive").await.unwrap();

        let renamed = h.files.rename(owner, docs.id, "Papers").await.unwrap();
        assert_eq!(renamed.name, "Papers");
        // Renaming to its own name is not a conflict.
        h.files.rename(owner, docs.id, "Papers").await.unwrap();

        let err = h.files.rename(owner, docs.id, "Archive").await.unwrap_err();
        assert!(matches!(err, FileError::Conflict(_)));
        let err = h.files.rename(owner, docs.id, "").await.unwrap_err();
        assert!(matches!(err, FileError::ValidationFailed(_)));
        let err = h.files.rename(Uuid::new_v4(), docs.id, "Mine").await.unwrap_err();
        assert!(matches!(err, FileError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_removes_subtree_and_blobs() {
        let h = TestHarness::new().await;
        let owner = h.user.id;
        let docs = h.files.create_folder(owner, None, "Docs").await.unwrap();
        let reports = h.files.create_folder(owner, Some(docs.id), "Reports").await.unwrap();
        let file = h
            .files
            .upload_file(&h.user, Some(reports.id), None, upload("q1.txt", b"q1"))
            .await
            .unwrap();
        let blob = h.blobs.physical_path(&file.metadata.unwrap().storage_path);
        assert!(blob.exists());

        let deleted = h.files.delete(owner, docs.id).await.unwrap();
        assert_eq!(deleted.removed, 3);
        assert_eq!(deleted.blob_paths.len(), 1);
        assert!(!blob.exists());
        assert_eq!(count_entries(&h.db).await, 0);

        let err = h.files.delete(owner, docs.id).await.unwrap_err();
        assert!(matches!(err, FileError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_reports_blob_failure_after_commit() {
        let db = Database::open_in_memory().await.unwrap();
        let owner = Uuid::new_v4();
        let store = TreeStore::new(db.pool().clone());
        let mut conn = store.acquire().await.unwrap();
        let meta = FileMetadata {
            encoding: DEFAULT_ENCODING.into(),
            mime_type: "text/plain".into(),
            size_bytes: 1,
            storage_path: "uploads/ann/x.txt".into(),
        };
        let file = store
            .create(&mut conn, &NewEntry::file(owner, "x.txt", meta))
            .await
            .unwrap();
        drop(conn);

        let files = FileService::new(db.pool().clone(), Arc::new(BrokenBlobStore), 1024);
        let err = files.delete(owner, file.id).await.unwrap_err();
        assert!(matches!(err, FileError::StorageFailure(_)));
        assert_eq!(count_entries(&db).await, 0);
    }

    #[tokio::test]
    async fn test_download_link() {
        let h = TestHarness::new().await;
        let file = h
            .files
            .upload_file(&h.user, None, Some("notes"), upload("notes.txt", b"hello"))
            .await
            .unwrap();

        let link = h
            .files
            .download(AccessRoute::Owned(h.user.id), file.id)
            .await
            .unwrap();
        assert_eq!(link.filename, "notes.txt");
        assert!(link.url.contains("/blobs/uploads/"));
        assert!(link.url.contains("name=notes.txt"));
        assert!(link.url.contains("type=text%2Fplain"));

        let folder = h.files.create_folder(h.user.id, None, "Docs").await.unwrap();
        let err = h
            .files
            .download(AccessRoute::Owned(h.user.id), folder.id)
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::NotFound));
        let err = h.files.download(AccessRoute::SharedLink, file.id).await.unwrap_err();
        assert!(matches!(err, FileError::NotFound));
    }

    #[tokio::test]
    async fn test_new_entries_inherit_valid_share() {
        let h = TestHarness::new().await;
        let owner = h.user.id;
        let docs = h.files.create_folder(owner, None, "Docs").await.unwrap();
        let expires = h.files.share(owner, docs.id, 3).await.unwrap();

        let reports = h.files.create_folder(owner, Some(docs.id), "Reports").await.unwrap();
        assert!(reports.is_shared);
        assert_eq!(reports.share_expires_at, Some(expires));

        let file = h
            .files
            .upload_file(&h.user, Some(reports.id), None, upload("q1.txt", b"q1"))
            .await
            .unwrap();
        assert!(file.is_shared);
        assert_eq!(file.share_expires_at, Some(expires));

        // An expired parent passes nothing on.
        sqlx::query("UPDATE entries SET share_expires_at = ? WHERE id = ?")
            .bind(Utc::now() - Duration::seconds(1))
            .bind(docs.id)
            .execute(h.db.pool())
            .await
            .unwrap();
        let late = h.files.create_folder(owner, Some(docs.id), "Late").await.unwrap();
        assert!(!late.is_shared);
    }

    #[tokio::test]
    async fn test_docs_reports_walkthrough() {
        let h = TestHarness::new().await;
        let owner = h.user.id;

        let docs = h.files.create_folder(owner, None, "Docs").await.unwrap();
        let reports = h.files.create_folder(owner, Some(docs.id), "Reports").await.unwrap();
        h.files.share(owner, docs.id, 7).await.unwrap();
        let q1 = h
            .files
            .upload_file(&h.user, Some(reports.id), None, upload("q1.txt", b"q1"))
            .await
            .unwrap();

        let view = h.files.view(AccessRoute::SharedLink, reports.id).await.unwrap();
        assert_eq!(view.ancestors.len(), 1);
        assert_eq!(view.ancestors[0].name, "Docs");
        assert_eq!(view.children.len(), 1);
        assert_eq!(view.children[0].id, q1.id);

        let link = h.files.download(AccessRoute::SharedLink, q1.id).await.unwrap();
        assert_eq!(link.filename, "q1.txt");

        h.files.unshare(owner, reports.id).await.unwrap();
        let err = h.files.view(AccessRoute::SharedLink, reports.id).await.unwrap_err();
        assert!(matches!(err, FileError::NotFound));
        let err = h.files.download(AccessRoute::SharedLink, q1.id).await.unwrap_err();
        assert!(matches!(err, FileError::NotFound));

        // Docs itself is still shared, but no longer lists Reports.
        let view = h.files.view(AccessRoute::SharedLink, docs.id).await.unwrap();
        assert!(view.children.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_root_creates_conflict_once() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/race.db", dir.path().display());
        let db = Database::connect(&url, 4).await.unwrap();
        db.migrate().await.unwrap();
        let blobs = Arc::new(crate::services::blob_store::LocalBlobStore::new(
            dir.path().join("blobs"),
            "http://files.test",
            "secret",
        ));
        let files = FileService::new(db.pool().clone(), blobs, 1024);
        let owner = Uuid::new_v4();

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let files = files.clone();
                tokio::spawn(async move { files.create_folder(owner, None, "Docs").await })
            })
            .collect();

        let mut created = 0;
        let mut conflicts = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(FileError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(conflicts, 3);
        assert_eq!(files.list_root(owner).await.unwrap().len(), 1);
        db.close().await;
    }
}
