//! Represents a node (file or folder) in a user's file tree.

use super::metadata::FileMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A file or folder owned by a single user.
///
/// Names are unique among siblings (including the root level, where
/// `parent_id` is `None`). Only files carry `metadata`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Entry {
    pub id: Uuid,

    /// ID of the owning user.
    pub owner_id: Uuid,

    /// Display name, 1–100 characters.
    pub name: String,

    pub is_dir: bool,

    /// Parent folder, `None` at the root level.
    pub parent_id: Option<Uuid>,

    pub is_shared: bool,

    /// Only meaningful while `is_shared` is set.
    pub share_expires_at: Option<DateTime<Utc>>,

    /// Set on the entry a share was granted on. Share links only reach
    /// entries whose shared region tops out at one of these.
    #[serde(skip_serializing, default)]
    pub share_root: bool,

    pub created_at: DateTime<Utc>,

    /// Present iff `!is_dir`.
    pub metadata: Option<FileMetadata>,
}

impl Entry {
    /// True when the entry is flagged shared and the expiry has not passed.
    pub fn share_is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_shared && self.share_expires_at.is_some_and(|at| at > now)
    }

    /// True when the entry is still flagged shared but its expiry has passed.
    pub fn share_is_stale(&self, now: DateTime<Utc>) -> bool {
        self.is_shared && self.share_expires_at.is_none_or(|at| at <= now)
    }

    /// Filename to offer on download: the logical name, with the stored
    /// blob's extension appended when the name does not already end in it.
    pub fn download_name(&self) -> String {
        let Some(ext) = self.metadata.as_ref().and_then(|m| m.stored_extension()) else {
            return self.name.clone();
        };
        let suffix = format!(".{}", ext.to_lowercase());
        if self.name.to_lowercase().ends_with(&suffix) {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, ext)
        }
    }
}

/// Flat row shape of `entries LEFT JOIN entry_metadata`.
#[derive(FromRow, Debug)]
pub struct EntryRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub is_dir: bool,
    pub parent_id: Option<Uuid>,
    pub is_shared: bool,
    pub share_expires_at: Option<DateTime<Utc>>,
    pub share_root: bool,
    pub created_at: DateTime<Utc>,
    pub encoding: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub storage_path: Option<String>,
}

impl From<EntryRow> for Entry {
    fn from(row: EntryRow) -> Self {
        let metadata = match (row.encoding, row.mime_type, row.size_bytes, row.storage_path) {
            (Some(encoding), Some(mime_type), Some(size_bytes), Some(storage_path)) => {
                Some(FileMetadata {
                    encoding,
                    mime_type,
                    size_bytes,
                    storage_path,
                })
            }
            _ => None,
        };
        Entry {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            is_dir: row.is_dir,
            parent_id: row.parent_id,
            is_shared: row.is_shared,
            share_expires_at: row.share_expires_at,
            share_root: row.share_root,
            created_at: row.created_at,
            metadata,
        }
    }
}

/// Data for inserting a new entry.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub owner_id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub is_shared: bool,
    pub share_expires_at: Option<DateTime<Utc>>,
    /// `Some` for files, `None` for folders.
    pub metadata: Option<FileMetadata>,
}

impl NewEntry {
    /// A folder with no sharing state.
    pub fn folder(owner_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            owner_id,
            name: name.into(),
            parent_id: None,
            is_shared: false,
            share_expires_at: None,
            metadata: None,
        }
    }

    /// A file pointing at already-stored content.
    pub fn file(owner_id: Uuid, name: impl Into<String>, metadata: FileMetadata) -> Self {
        Self {
            metadata: Some(metadata),
            ..Self::folder(owner_id, name)
        }
    }

    pub fn with_parent(mut self, parent_id: Option<Uuid>) -> Self {
        self.parent_id = parent_id;
        self
    }

    /// Copy the share state of `parent` when it is currently shared.
    pub fn inheriting_share(mut self, parent: Option<&Entry>, now: DateTime<Utc>) -> Self {
        if let Some(parent) = parent.filter(|p| p.share_is_valid(now)) {
            self.is_shared = true;
            self.share_expires_at = parent.share_expires_at;
        }
        self
    }

    pub fn is_dir(&self) -> bool {
        self.metadata.is_none()
    }
}
