//! Anonymous, read-only share-link routes under `/share`.

use crate::{
    errors::AppError, handlers::extract::EntryId, handlers::views::ListingBody,
    services::access::AccessRoute, state::AppState,
};
use axum::{Json, extract::State, response::Redirect};

/// `GET /share/{id}`
pub async fn view_shared(
    State(state): State<AppState>,
    EntryId(id): EntryId,
) -> Result<Json<ListingBody>, AppError> {
    let view = state.files.view(AccessRoute::SharedLink, id).await?;
    Ok(Json(view.into()))
}

/// `GET /share/{id}/download`
pub async fn download_shared(
    State(state): State<AppState>,
    EntryId(id): EntryId,
) -> Result<Redirect, AppError> {
    let link = state.files.download(AccessRoute::SharedLink, id).await?;
    tracing::debug!(entry_id = %id, "issued shared download link for {}", link.filename);
    Ok(Redirect::to(&link.url))
}
