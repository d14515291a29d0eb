//! Routes of the file-tree service.
//!
//! ## Structure
//! - **Owner routes** (require the forwarded principal)
//!   - `GET        /files` list root entries
//!   - `GET        /files/{id}` view an entry with children and breadcrumbs
//!   - `GET        /files/{id}/download` redirect to a signed download URL
//!   - `GET, POST  /files[/{id}]/create` create a folder
//!   - `GET, POST  /files[/{id}]/upload` upload a file (multipart)
//!   - `GET, POST  /files/{id}/rename`, `/delete`, `/share`
//!   - `POST       /files/{id}/unshare`
//!
//! - **Share-link routes** (anonymous, read-only)
//!   - `GET /share/{id}` and `GET /share/{id}/download`
//!
//! - **Blob downloads**: `GET /blobs/{*path}` serves signed URLs.

use crate::{
    handlers::{
        blob_handlers::get_blob,
        file_handlers::{
            create_folder, create_folder_form, create_root_folder, create_root_folder_form,
            delete_entry, delete_form, download_entry, list_root, rename_entry, rename_form,
            share_entry, share_form, unshare_entry, upload_file, upload_form, upload_root_file,
            upload_root_form, view_entry,
        },
        health_handlers::{healthz, readyz},
        share_handlers::{download_shared, view_shared},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Room for multipart boundaries and the other form parts.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the router. Request bodies may exceed `max_file_size` only by
/// multipart overhead; the upload service checks the file size itself.
pub fn routes(max_file_size: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Owner routes
        .route("/files", get(list_root))
        .route(
            "/files/create",
            get(create_root_folder_form).post(create_root_folder),
        )
        .route("/files/upload", get(upload_root_form).post(upload_root_file))
        .route("/files/{id}", get(view_entry))
        .route("/files/{id}/download", get(download_entry))
        .route("/files/{id}/create", get(create_folder_form).post(create_folder))
        .route("/files/{id}/upload", get(upload_form).post(upload_file))
        .route("/files/{id}/rename", get(rename_form).post(rename_entry))
        .route("/files/{id}/delete", get(delete_form).post(delete_entry))
        .route("/files/{id}/share", get(share_form).post(share_entry))
        .route("/files/{id}/unshare", post(unshare_entry))
        // Share-link routes
        .route("/share/{id}", get(view_shared))
        .route("/share/{id}/download", get(download_shared))
        // Signed blob downloads
        .route("/blobs/{*path}", get(get_blob))
        .layer(DefaultBodyLimit::max(body_limit))
}
