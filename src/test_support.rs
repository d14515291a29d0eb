//! Fixtures shared by unit and router tests.

use crate::{
    models::principal::Principal,
    services::{blob_store::LocalBlobStore, database::Database, file_service::FileService},
    state::AppState,
};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

pub const PUBLIC_URL: &str = "http://files.test";

pub fn principal() -> Principal {
    Principal {
        id: Uuid::new_v4(),
        username: "ann.lee".into(),
    }
}

/// In-memory database plus a temp-dir blob store.
pub struct TestHarness {
    pub db: Database,
    pub blobs: Arc<LocalBlobStore>,
    pub files: FileService,
    pub state: AppState,
    pub user: Principal,
    _dir: TempDir,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_limit(1024 * 1024).await
    }

    pub async fn with_limit(max_file_size: u64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let blobs = Arc::new(LocalBlobStore::new(
            dir.path().join("blobs"),
            PUBLIC_URL,
            "test-secret",
        ));
        let state = AppState::new(db.clone(), blobs.clone(), max_file_size);
        Self {
            db,
            blobs,
            files: state.files.clone(),
            state,
            user: principal(),
            _dir: dir,
        }
    }
}
