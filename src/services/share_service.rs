//! Share propagation: apply or clear sharing state on a whole subtree in
//! one statement, decide share-link visibility from an ancestor chain, and
//! expire stale shares when they are read.
//!
//! There is no background sweeper. An expired share stays flagged in the
//! store until a read path hands it to [`ShareEngine::lazy_expire_if_stale`].

use crate::{
    models::entry::Entry,
    services::{
        file_error::{FileError, FileResult},
        tree_store::TreeStore,
    },
};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};
use uuid::Uuid;

pub const MIN_SHARE_DAYS: i64 = 1;

#[derive(Clone, Debug)]
pub struct ShareEngine {
    store: TreeStore,
}

impl ShareEngine {
    pub fn new(store: TreeStore) -> Self {
        Self { store }
    }

    /// Share `root_id` and every descendant until `now + duration_days`,
    /// making `root_id` the only grant root in the subtree. Re-sharing
    /// restarts the clock. Returns the new expiry.
    pub async fn share_subtree(
        &self,
        root_id: Uuid,
        owner_id: Uuid,
        duration_days: i64,
    ) -> FileResult<DateTime<Utc>> {
        let expires_at = share_expiry(Utc::now(), duration_days)?;

        let mut tx = self.store.begin_write(owner_id).await?;
        let touched = self
            .store
            .set_subtree_share(&mut tx, root_id, owner_id, true, expires_at)
            .await?;
        if touched == 0 {
            return Err(FileError::NotFound);
        }
        tx.commit().await?;

        info!(%root_id, touched, %expires_at, "shared subtree");
        Ok(expires_at)
    }

    /// Unshare `root_id` and every descendant, stamping the expiry to now.
    pub async fn unshare_subtree(&self, root_id: Uuid, owner_id: Uuid) -> FileResult<()> {
        let mut tx = self.store.begin_write(owner_id).await?;
        let touched = self
            .store
            .set_subtree_share(&mut tx, root_id, owner_id, false, Utc::now())
            .await?;
        if touched == 0 {
            return Err(FileError::NotFound);
        }
        tx.commit().await?;

        info!(%root_id, touched, "unshared subtree");
        Ok(())
    }

    /// If `entry` is flagged shared but expired, flip it and every
    /// descendant whose own expiry has also passed to unshared.
    ///
    /// Descendants still within their own expiry are left alone. Returns the
    /// number of entries expired.
    pub async fn lazy_expire_if_stale(&self, entry: &Entry) -> FileResult<u64> {
        let now = Utc::now();
        if !entry.share_is_stale(now) {
            return Ok(0);
        }

        let mut tx = self.store.begin_write(entry.owner_id).await?;
        let stale: Vec<Uuid> = self
            .store
            .find_subtree(&mut tx, entry.id, entry.owner_id)
            .await?
            .into_iter()
            .filter(|e| e.share_is_stale(now))
            .map(|e| e.id)
            .collect();
        let expired = self
            .store
            .expire_entries(&mut tx, entry.owner_id, &stale, now)
            .await?;
        tx.commit().await?;

        debug!(entry_id = %entry.id, expired, "lazily expired stale share");
        Ok(expired)
    }

    /// Run lazy expiry on every stale entry in `entries` and patch them in
    /// place to match what was written.
    pub async fn expire_stale(&self, entries: &mut [Entry]) -> FileResult<()> {
        let now = Utc::now();
        for entry in entries.iter_mut().filter(|e| e.share_is_stale(now)) {
            self.lazy_expire_if_stale(entry).await?;
            entry.is_shared = false;
            entry.share_root = false;
            entry.share_expires_at = Some(now);
        }
        Ok(())
    }
}

/// `now + days`, rejecting non-positive or overflowing durations.
pub fn share_expiry(now: DateTime<Utc>, days: i64) -> FileResult<DateTime<Utc>> {
    if days < MIN_SHARE_DAYS {
        return Err(FileError::invalid(
            "days",
            format!("Share duration must be at least {}", MIN_SHARE_DAYS),
        ));
    }
    TimeDelta::try_days(days)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| FileError::invalid("days", "Share duration is too long"))
}

/// How far a share-link visitor may see up the tree from `entry`.
///
/// `ancestors` runs from the immediate parent to the root. The shared region
/// is `entry` plus the unbroken run of validly shared ancestors above it, and
/// its topmost entry must be a grant root. A region cut short by an ancestor
/// that expired or was unshared therefore hides everything under it, whether
/// or not lazy expiry has already cleared that ancestor's flag.
///
/// Returns `None` when `entry` is hidden, otherwise how many ancestors (from
/// the parent upwards) belong to the region.
pub fn share_link_reach(entry: &Entry, ancestors: &[Entry], now: DateTime<Utc>) -> Option<usize> {
    if !entry.share_is_valid(now) {
        return None;
    }
    let reach = ancestors
        .iter()
        .position(|a| !a.share_is_valid(now))
        .unwrap_or(ancestors.len());
    let top = match reach {
        0 => entry,
        n => &ancestors[n - 1],
    };
    top.share_root.then_some(reach)
}

/// Owners always see their entries; share-link visitors see them only
/// through an unbroken, unexpired share chain.
pub fn resolve_effective_visibility(
    entry: &Entry,
    ancestors: &[Entry],
    via_share_link: bool,
    now: DateTime<Utc>,
) -> bool {
    !via_share_link || share_link_reach(entry, ancestors, now).is_some()
}
