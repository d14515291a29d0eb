//! Resolves an entry for a request and decides what the caller may see.
//!
//! Owners reach their own entries through [`AccessRoute::Owned`]. Anyone
//! holding a share link goes through [`AccessRoute::SharedLink`], which only
//! reaches entries inside an unbroken, unexpired shared region. Both routes
//! report "missing", "not yours" and "not shared" as the same `NotFound`.
//!
//! Every read here also expires stale shares it walks past.

use crate::{
    models::entry::Entry,
    services::{
        file_error::{FileError, FileResult},
        share_service::{ShareEngine, resolve_effective_visibility, share_link_reach},
        tree_store::{Scope, TreeStore},
    },
};
use chrono::Utc;
use std::{iter, slice};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRoute {
    /// The caller's own tree.
    Owned(Uuid),
    /// Anonymous access through a share link.
    SharedLink,
}

impl AccessRoute {
    pub fn is_shared_link(&self) -> bool {
        matches!(self, AccessRoute::SharedLink)
    }
}

/// An entry together with the breadcrumbs the caller may see.
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    pub entry: Entry,
    /// Root first. On share links this stops at the top of the shared region.
    pub ancestors: Vec<Entry>,
}

#[derive(Clone, Debug)]
pub struct AccessResolver {
    store: TreeStore,
    shares: ShareEngine,
}

impl AccessResolver {
    pub fn new(store: TreeStore, shares: ShareEngine) -> Self {
        Self { store, shares }
    }

    pub async fn resolve(&self, route: AccessRoute, id: Uuid) -> FileResult<ResolvedEntry> {
        match route {
            AccessRoute::Owned(owner_id) => self.resolve_owned(owner_id, id).await,
            AccessRoute::SharedLink => self.resolve_shared(id).await,
        }
    }

    async fn resolve_owned(&self, owner_id: Uuid, id: Uuid) -> FileResult<ResolvedEntry> {
        let (mut entry, mut ancestors) = {
            let mut conn = self.store.acquire().await?;
            let entry = self
                .store
                .find_by_id(&mut conn, id, Scope::Owner(owner_id))
                .await?
                .ok_or(FileError::NotFound)?;
            let ancestors = self
                .store
                .find_ancestor_chain(&mut conn, id, owner_id)
                .await?;
            (entry, ancestors)
        };

        self.shares.expire_stale(&mut ancestors).await?;
        self.shares.expire_stale(slice::from_mut(&mut entry)).await?;

        ancestors.reverse();
        Ok(ResolvedEntry { entry, ancestors })
    }

    async fn resolve_shared(&self, id: Uuid) -> FileResult<ResolvedEntry> {
        let (mut entry, mut ancestors) = {
            let mut conn = self.store.acquire().await?;
            let entry = self
                .store
                .find_by_id(&mut conn, id, Scope::Shared)
                .await?
                .ok_or(FileError::NotFound)?;
            let ancestors = self
                .store
                .find_ancestor_chain(&mut conn, entry.id, entry.owner_id)
                .await?;
            (entry, ancestors)
        };

        // Decide on the snapshot, before anything gets expired.
        let now = Utc::now();
        let reach = share_link_reach(&entry, &ancestors, now);

        let walked = if entry.share_is_valid(now) {
            ancestors
                .iter()
                .position(|a| !a.share_is_valid(now))
                .map_or(ancestors.len(), |i| i + 1)
        } else {
            0
        };
        self.shares.expire_stale(&mut ancestors[..walked]).await?;
        self.shares.expire_stale(slice::from_mut(&mut entry)).await?;

        let reach = reach.ok_or(FileError::NotFound)?;
        ancestors.truncate(reach);
        ancestors.reverse();
        Ok(ResolvedEntry { entry, ancestors })
    }

    /// Children of a resolved entry as the route sees them. Share-link
    /// visitors only see children that are themselves validly shared.
    pub async fn list_children(
        &self,
        route: AccessRoute,
        resolved: &ResolvedEntry,
    ) -> FileResult<Vec<Entry>> {
        let parent = &resolved.entry;
        if !parent.is_dir {
            return Ok(Vec::new());
        }
        let mut children = {
            let mut conn = self.store.acquire().await?;
            self.store
                .find_children(&mut conn, parent.id, parent.owner_id)
                .await?
        };
        self.shares.expire_stale(&mut children).await?;

        // Parent first, up to the top of whatever `resolve` let through.
        let chain: Vec<Entry> = iter::once(parent.clone())
            .chain(resolved.ancestors.iter().rev().cloned())
            .collect();
        let now = Utc::now();
        children.retain(|c| resolve_effective_visibility(c, &chain, route.is_shared_link(), now));
        Ok(children)
    }

    /// The owner's root-level entries, ordered by name.
    pub async fn list_root(&self, owner_id: Uuid) -> FileResult<Vec<Entry>> {
        let mut entries = {
            let mut conn = self.store.acquire().await?;
            self.store.find_root_entries(&mut conn, owner_id).await?
        };
        self.shares.expire_stale(&mut entries).await?;
        Ok(entries)
    }
}
