//! Owner routes under `/files`.
//!
//! `GET` form routes answer with the form context once the target exists.
//! Successful `POST`s answer `303 See Other` pointing at the listing the
//! entry lives in.

use crate::{
    errors::AppError,
    handlers::{
        extract::EntryId,
        views::{EntryBody, FormBody, ListingBody, listing_location},
    },
    models::principal::Principal,
    services::{
        access::AccessRoute,
        file_error::FileError,
        file_service::{DEFAULT_ENCODING, Upload},
    },
    state::AppState,
    validation::SHARE_FORM,
};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    response::Redirect,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct NameForm {
    pub name: Option<String>,
}

/// `days` may arrive as a JSON number or a string from a plain form.
#[derive(Debug, Deserialize)]
pub struct ShareForm {
    pub days: Option<Value>,
}

/// `GET /files`
pub async fn list_root(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<ListingBody>, AppError> {
    let entries = state.files.list_root(principal.id).await?;
    Ok(Json(ListingBody::root(entries)))
}

/// `GET /files/{id}`
pub async fn view_entry(
    State(state): State<AppState>,
    principal: Principal,
    EntryId(id): EntryId,
) -> Result<Json<ListingBody>, AppError> {
    let view = state.files.view(AccessRoute::Owned(principal.id), id).await?;
    Ok(Json(view.into()))
}

/// `GET /files/{id}/download`: redirect to a short-lived signed URL.
pub async fn download_entry(
    State(state): State<AppState>,
    principal: Principal,
    EntryId(id): EntryId,
) -> Result<Redirect, AppError> {
    let link = state
        .files
        .download(AccessRoute::Owned(principal.id), id)
        .await?;
    tracing::debug!(entry_id = %id, "issued download link for {}", link.filename);
    Ok(Redirect::to(&link.url))
}

async fn folder_form(
    state: &AppState,
    principal: &Principal,
    parent_id: Option<Uuid>,
    title: &'static str,
    max_file_size: Option<u64>,
) -> Result<Json<FormBody>, AppError> {
    if let Some(parent_id) = parent_id {
        state.files.owned_folder(principal.id, parent_id).await?;
    }
    Ok(Json(FormBody {
        title,
        parent_id,
        entry: None,
        max_file_size,
    }))
}

/// `GET /files/create`
pub async fn create_root_folder_form(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<FormBody>, AppError> {
    folder_form(&state, &principal, None, "Create Folder", None).await
}

/// `GET /files/{id}/create`
pub async fn create_folder_form(
    State(state): State<AppState>,
    principal: Principal,
    EntryId(id): EntryId,
) -> Result<Json<FormBody>, AppError> {
    folder_form(&state, &principal, Some(id), "Create Folder", None).await
}

async fn create_folder_in(
    state: &AppState,
    principal: &Principal,
    parent_id: Option<Uuid>,
    form: NameForm,
) -> Result<Redirect, AppError> {
    let name = form.name.unwrap_or_default();
    state
        .files
        .create_folder(principal.id, parent_id, &name)
        .await?;
    Ok(Redirect::to(&listing_location(parent_id)))
}

/// `POST /files/create`
pub async fn create_root_folder(
    State(state): State<AppState>,
    principal: Principal,
    Json(form): Json<NameForm>,
) -> Result<Redirect, AppError> {
    create_folder_in(&state, &principal, None, form).await
}

/// `POST /files/{id}/create`
pub async fn create_folder(
    State(state): State<AppState>,
    principal: Principal,
    EntryId(id): EntryId,
    Json(form): Json<NameForm>,
) -> Result<Redirect, AppError> {
    create_folder_in(&state, &principal, Some(id), form).await
}

/// `GET /files/upload`
pub async fn upload_root_form(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<FormBody>, AppError> {
    let limit = Some(state.files.max_file_size());
    folder_form(&state, &principal, None, "Upload File", limit).await
}

/// `GET /files/{id}/upload`
pub async fn upload_form(
    State(state): State<AppState>,
    principal: Principal,
    EntryId(id): EntryId,
) -> Result<Json<FormBody>, AppError> {
    let limit = Some(state.files.max_file_size());
    folder_form(&state, &principal, Some(id), "Upload File", limit).await
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

/// Pull the `file` and optional `name` parts out of an upload form.
async fn read_upload(mut multipart: Multipart) -> Result<(Option<String>, Upload), AppError> {
    let mut name = None;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("name") => name = Some(field.text().await.map_err(multipart_error)?),
            Some("file") => {
                let original_name = field.file_name().unwrap_or_default().to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let encoding = field
                    .headers()
                    .get("content-transfer-encoding")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or(DEFAULT_ENCODING)
                    .to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if original_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                upload = Some(Upload {
                    original_name,
                    mime_type,
                    encoding,
                    bytes,
                });
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| FileError::invalid("file", "Please select a file"))?;
    Ok((name, upload))
}

async fn upload_into(
    state: &AppState,
    principal: &Principal,
    parent_id: Option<Uuid>,
    multipart: Multipart,
) -> Result<Redirect, AppError> {
    let (name, upload) = read_upload(multipart).await?;
    state
        .files
        .upload_file(principal, parent_id, name.as_deref(), upload)
        .await?;
    Ok(Redirect::to(&listing_location(parent_id)))
}

/// `POST /files/upload`
pub async fn upload_root_file(
    State(state): State<AppState>,
    principal: Principal,
    multipart: Multipart,
) -> Result<Redirect, AppError> {
    upload_into(&state, &principal, None, multipart).await
}

/// `POST /files/{id}/upload`
pub async fn upload_file(
    State(state): State<AppState>,
    principal: Principal,
    EntryId(id): EntryId,
    multipart: Multipart,
) -> Result<Redirect, AppError> {
    upload_into(&state, &principal, Some(id), multipart).await
}

async fn entry_form(
    state: &AppState,
    principal: &Principal,
    id: Uuid,
    title: &'static str,
) -> Result<Json<FormBody>, AppError> {
    let entry = state.files.find(AccessRoute::Owned(principal.id), id).await?;
    Ok(Json(FormBody {
        title,
        parent_id: entry.parent_id,
        entry: Some(EntryBody::from(entry)),
        max_file_size: None,
    }))
}

/// `GET /files/{id}/rename`
pub async fn rename_form(
    State(state): State<AppState>,
    principal: Principal,
    EntryId(id): EntryId,
) -> Result<Json<FormBody>, AppError> {
    entry_form(&state, &principal, id, "Rename").await
}

/// `POST /files/{id}/rename`
pub async fn rename_entry(
    State(state): State<AppState>,
    principal: Principal,
    EntryId(id): EntryId,
    Json(form): Json<NameForm>,
) -> Result<Redirect, AppError> {
    let name = form.name.unwrap_or_default();
    let entry = state.files.rename(principal.id, id, &name).await?;
    Ok(Redirect::to(&listing_location(entry.parent_id)))
}

/// `GET /files/{id}/delete`
pub async fn delete_form(
    State(state): State<AppState>,
    principal: Principal,
    EntryId(id): EntryId,
) -> Result<Json<FormBody>, AppError> {
    entry_form(&state, &principal, id, "Delete").await
}

/// `POST /files/{id}/delete`
pub async fn delete_entry(
    State(state): State<AppState>,
    principal: Principal,
    EntryId(id): EntryId,
) -> Result<Redirect, AppError> {
    let deleted = state.files.delete(principal.id, id).await?;
    Ok(Redirect::to(&listing_location(deleted.root.parent_id)))
}

/// `GET /files/{id}/share`
pub async fn share_form(
    State(state): State<AppState>,
    principal: Principal,
    EntryId(id): EntryId,
) -> Result<Json<FormBody>, AppError> {
    entry_form(&state, &principal, id, "Share").await
}

fn share_days(form: &ShareForm) -> Result<i64, AppError> {
    let raw = match &form.days {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };
    SHARE_FORM
        .validate(&[("days", raw.as_deref())])
        .map_err(AppError::validation)?;
    raw.as_deref()
        .map(str::trim_end)
        .and_then(|days| days.parse::<i64>().ok())
        .ok_or_else(|| FileError::invalid("days", "Share duration must be a whole number").into())
}

/// `POST /files/{id}/share`
pub async fn share_entry(
    State(state): State<AppState>,
    principal: Principal,
    EntryId(id): EntryId,
    Json(form): Json<ShareForm>,
) -> Result<Redirect, AppError> {
    let days = share_days(&form)?;
    let entry = state.files.find(AccessRoute::Owned(principal.id), id).await?;
    state.files.share(principal.id, id, days).await?;
    Ok(Redirect::to(&listing_location(entry.parent_id)))
}

/// `POST /files/{id}/unshare`
pub async fn unshare_entry(
    State(state): State<AppState>,
    principal: Principal,
    EntryId(id): EntryId,
) -> Result<Redirect, AppError> {
    let entry = state.files.find(AccessRoute::Owned(principal.id), id).await?;
    state.files.unshare(principal.id, id).await?;
    Ok(Redirect::to(&listing_location(entry.parent_id)))
}
