//! Shared router state.

use crate::services::{
    blob_store::LocalBlobStore, database::Database, file_service::FileService,
};
use std::sync::Arc;

/// Everything a handler can reach. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub files: FileService,
    /// The concrete store behind `files`, needed to serve signed blob URLs.
    pub blobs: Arc<LocalBlobStore>,
}

impl AppState {
    pub fn new(db: Database, blobs: Arc<LocalBlobStore>, max_file_size: u64) -> Self {
        let files = FileService::new(db.pool().clone(), blobs.clone(), max_file_size);
        Self { db, files, blobs }
    }
}
