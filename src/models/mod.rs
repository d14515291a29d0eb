//! Core data models for the file tree.
//!
//! Entries map to the `entries` table (with an optional `entry_metadata`
//! row joined in) via `sqlx::FromRow`, and serialize as JSON via `serde`.

pub mod entry;
pub mod metadata;
pub mod principal;
