//! Request extractors: the forwarded principal and entry ids in paths.

use crate::{errors::AppError, models::principal::Principal, validation::PRINCIPAL};
use axum::{
    extract::{FromRequestParts, Path},
    http::{HeaderMap, request::Parts},
};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from_headers(&parts.headers)
    }
}

fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, AppError> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let id = header(USER_ID_HEADER)
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| AppError::unauthorized("Please sign in first!"))?;
    let username = header(USER_NAME_HEADER).unwrap_or_default();
    if let Err(fields) = PRINCIPAL.validate(&[("username", Some(username))]) {
        tracing::debug!("rejected principal {}: {:?}", id, fields);
        return Err(AppError::unauthorized("Please sign in first!"));
    }

    Ok(Principal {
        id,
        username: username.to_string(),
    })
}

/// The `{id}` path segment, parsed as an entry id.
#[derive(Debug, Clone, Copy)]
pub struct EntryId(pub Uuid);

impl<S> FromRequestParts<S> for EntryId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::bad_request("Invalid file!"))?;
        Uuid::parse_str(&raw)
            .map(EntryId)
            .map_err(|_| AppError::bad_request("Invalid file!"))
    }
}
