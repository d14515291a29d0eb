//! JSON bodies returned by the entry handlers.

use crate::{models::entry::Entry, services::file_service::EntryView};
use serde::Serialize;
use uuid::Uuid;

/// An entry as rendered to clients, with its size in readable form.
#[derive(Debug, Serialize)]
pub struct EntryBody {
    #[serde(flatten)]
    pub entry: Entry,
    pub human_size: Option<String>,
}

impl From<Entry> for EntryBody {
    fn from(entry: Entry) -> Self {
        let human_size = entry.metadata.as_ref().map(|m| m.human_size());
        Self { entry, human_size }
    }
}

/// A listing: root (no `entry`) or a folder with its breadcrumbs.
#[derive(Debug, Serialize)]
pub struct ListingBody {
    pub entry: Option<EntryBody>,
    pub ancestors: Vec<EntryBody>,
    pub children: Vec<EntryBody>,
}

impl ListingBody {
    pub fn root(children: Vec<Entry>) -> Self {
        Self {
            entry: None,
            ancestors: Vec::new(),
            children: children.into_iter().map(EntryBody::from).collect(),
        }
    }
}

impl From<EntryView> for ListingBody {
    fn from(view: EntryView) -> Self {
        Self {
            entry: Some(view.entry.into()),
            ancestors: view.ancestors.into_iter().map(EntryBody::from).collect(),
            children: view.children.into_iter().map(EntryBody::from).collect(),
        }
    }
}

/// Context for a `GET` form route.
#[derive(Debug, Serialize)]
pub struct FormBody {
    pub title: &'static str,
    pub parent_id: Option<Uuid>,
    pub entry: Option<EntryBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u64>,
}

/// Where a successful mutation sends the client next.
pub fn listing_location(parent_id: Option<Uuid>) -> String {
    match parent_id {
        Some(id) => format!("/files/{}", id),
        None => "/files".to_string(),
    }
}
