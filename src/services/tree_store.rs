//! TreeStore: relational persistence for the per-user entry tree.
//!
//! Every query takes a `&mut SqliteConnection` so callers decide whether it
//! runs inside a write transaction (see [`TreeStore::begin_write`]) or on a
//! plain pooled connection. Ancestor and subtree lookups are single
//! recursive CTE queries, never per-level round trips.

use crate::models::entry::{Entry, EntryRow, NewEntry};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool, Transaction, pool::PoolConnection};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("entry not found")]
    NotFound,
    #[error("an entry named `{0}` already exists in this folder")]
    Conflict(String),
    #[error("referenced parent entry does not exist")]
    ForeignKey,
    #[error("entry violates a store constraint: {0}")]
    Constraint(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type TreeResult<T> = Result<T, TreeError>;

/// Row filter applied by [`TreeStore::find_by_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only entries owned by this user.
    Owner(Uuid),
    /// Only entries currently flagged shared, whoever owns them.
    Shared,
}

/// What a delete removed from the store.
#[derive(Debug, Clone)]
pub struct DeletedTree {
    /// The entry the delete was issued for.
    pub root: Entry,
    /// Number of rows removed, the root included.
    pub removed: usize,
    /// Blob paths of every file in the removed subtree.
    pub blob_paths: Vec<String>,
}

const ENTRY_COLUMNS: &str = "e.id, e.owner_id, e.name, e.is_dir, e.parent_id, e.is_shared, \
     e.share_expires_at, e.share_root, e.created_at, \
     m.encoding, m.mime_type, m.size_bytes, m.storage_path";

const SUBTREE_CTE: &str = "WITH RECURSIVE subtree(id, depth) AS ( \
         SELECT id, 0 FROM entries WHERE id = ? AND owner_id = ? \
         UNION ALL \
         SELECT c.id, s.depth + 1 FROM entries c INNER JOIN subtree s ON c.parent_id = s.id \
     ) ";

#[derive(Clone, Debug)]
pub struct TreeStore {
    pool: SqlitePool,
}

impl TreeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// A pooled connection for reads outside a transaction.
    pub async fn acquire(&self) -> TreeResult<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Open a transaction holding the write lock for `owner_id`'s tree.
    ///
    /// The first statement is a write, so the database lock is taken before
    /// any existence check in the transaction reads.
    pub async fn begin_write(&self, owner_id: Uuid) -> TreeResult<Transaction<'static, Sqlite>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO tree_locks (owner_id, version) VALUES (?, 1)
             ON CONFLICT(owner_id) DO UPDATE SET version = version + 1",
        )
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;
        Ok(tx)
    }

    pub async fn find_by_id(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
        scope: Scope,
    ) -> TreeResult<Option<Entry>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT ");
        builder.push(ENTRY_COLUMNS);
        builder.push(
            " FROM entries e LEFT JOIN entry_metadata m ON m.entry_id = e.id WHERE e.id = ",
        );
        builder.push_bind(id);
        match scope {
            Scope::Owner(owner_id) => {
                builder.push(" AND e.owner_id = ");
                builder.push_bind(owner_id);
            }
            Scope::Shared => {
                builder.push(" AND e.is_shared = 1");
            }
        }

        let row: Option<EntryRow> = builder.build_query_as().fetch_optional(&mut *conn).await?;
        Ok(row.map(Entry::from))
    }

    /// Children of `parent_id`, ordered by name ascending.
    pub async fn find_children(
        &self,
        conn: &mut SqliteConnection,
        parent_id: Uuid,
        owner_id: Uuid,
    ) -> TreeResult<Vec<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries e
             LEFT JOIN entry_metadata m ON m.entry_id = e.id
             WHERE e.parent_id = ? AND e.owner_id = ?
             ORDER BY e.name ASC"
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(parent_id)
            .bind(owner_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(Entry::from).collect())
    }

    /// Root-level entries of `owner_id`, ordered by name ascending.
    pub async fn find_root_entries(
        &self,
        conn: &mut SqliteConnection,
        owner_id: Uuid,
    ) -> TreeResult<Vec<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries e
             LEFT JOIN entry_metadata m ON m.entry_id = e.id
             WHERE e.parent_id IS NULL AND e.owner_id = ?
             ORDER BY e.name ASC"
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(owner_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(Entry::from).collect())
    }

    /// Whether `owner_id` already has a root-level entry called `name`,
    /// optionally ignoring the entry `except`.
    ///
    /// The `(owner_id, parent_id, name)` constraint treats NULL parents as
    /// distinct, so this check must run inside the writing transaction.
    pub async fn root_name_taken(
        &self,
        conn: &mut SqliteConnection,
        owner_id: Uuid,
        name: &str,
        except: Option<Uuid>,
    ) -> TreeResult<bool> {
        let found: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM entries
             WHERE owner_id = ? AND parent_id IS NULL AND name = ?
             LIMIT 1",
        )
        .bind(owner_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(found.is_some_and(|id| Some(id) != except))
    }

    /// Insert an entry (and its metadata, for files).
    pub async fn create(&self, conn: &mut SqliteConnection, entry: &NewEntry) -> TreeResult<Entry> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        sqlx::query(
            "INSERT INTO entries (
                id, owner_id, name, is_dir, parent_id, is_shared, share_expires_at, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(entry.owner_id)
        .bind(&entry.name)
        .bind(entry.is_dir())
        .bind(entry.parent_id)
        .bind(entry.is_shared)
        .bind(entry.share_expires_at)
        .bind(created_at)
        .execute(&mut *conn)
        .await
        .map_err(|err| classify(err, &entry.name))?;

        if let Some(meta) = &entry.metadata {
            sqlx::query(
                "INSERT INTO entry_metadata (entry_id, encoding, mime_type, size_bytes, storage_path)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(&meta.encoding)
            .bind(&meta.mime_type)
            .bind(meta.size_bytes)
            .bind(&meta.storage_path)
            .execute(&mut *conn)
            .await
            .map_err(|err| classify(err, &entry.name))?;
        }

        Ok(Entry {
            id,
            owner_id: entry.owner_id,
            name: entry.name.clone(),
            is_dir: entry.is_dir(),
            parent_id: entry.parent_id,
            is_shared: entry.is_shared,
            share_expires_at: entry.share_expires_at,
            share_root: false,
            created_at,
            metadata: entry.metadata.clone(),
        })
    }

    pub async fn rename(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
        owner_id: Uuid,
        new_name: &str,
    ) -> TreeResult<()> {
        let result = sqlx::query("UPDATE entries SET name = ? WHERE id = ? AND owner_id = ?")
            .bind(new_name)
            .bind(id)
            .bind(owner_id)
            .execute(&mut *conn)
            .await
            .map_err(|err| classify(err, new_name))?;

        if result.rows_affected() == 0 {
            return Err(TreeError::NotFound);
        }
        Ok(())
    }

    /// Delete `id` and, through the cascading foreign keys, its whole
    /// subtree with all metadata rows.
    pub async fn delete(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
        owner_id: Uuid,
    ) -> TreeResult<DeletedTree> {
        let subtree = self.find_subtree(conn, id, owner_id).await?;
        let Some(root) = subtree.first().cloned() else {
            return Err(TreeError::NotFound);
        };

        let result = sqlx::query("DELETE FROM entries WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TreeError::NotFound);
        }

        let blob_paths = subtree
            .iter()
            .filter_map(|e| e.metadata.as_ref().map(|m| m.storage_path.clone()))
            .collect();

        Ok(DeletedTree {
            root,
            removed: subtree.len(),
            blob_paths,
        })
    }

    /// Ancestors of `id`, from its immediate parent up to the root.
    pub async fn find_ancestor_chain(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
        owner_id: Uuid,
    ) -> TreeResult<Vec<Entry>> {
        let sql = format!(
            "WITH RECURSIVE chain(id, depth) AS (
                 SELECT parent_id, 1 FROM entries WHERE id = ? AND owner_id = ?
                 UNION ALL
                 SELECT p.parent_id, c.depth + 1
                   FROM entries p INNER JOIN chain c ON p.id = c.id
                  WHERE p.parent_id IS NOT NULL
             )
             SELECT {ENTRY_COLUMNS} FROM chain c
             INNER JOIN entries e ON e.id = c.id
             LEFT JOIN entry_metadata m ON m.entry_id = e.id
             ORDER BY c.depth ASC"
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(Entry::from).collect())
    }

    /// `id` and all of its descendants, root first, then by depth and name.
    pub async fn find_subtree(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
        owner_id: Uuid,
    ) -> TreeResult<Vec<Entry>> {
        let sql = format!(
            "{SUBTREE_CTE}
             SELECT {ENTRY_COLUMNS} FROM subtree s
             INNER JOIN entries e ON e.id = s.id
             LEFT JOIN entry_metadata m ON m.entry_id = e.id
             ORDER BY s.depth ASC, e.name ASC"
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(Entry::from).collect())
    }

    /// Set the share state of `id` and every descendant in one statement.
    /// Sharing marks `id` alone as the grant root; unsharing clears every
    /// grant root in the subtree. Returns the number of rows touched (0 when
    /// `id` is not owned).
    pub async fn set_subtree_share(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
        owner_id: Uuid,
        is_shared: bool,
        expires_at: DateTime<Utc>,
    ) -> TreeResult<u64> {
        let sql = format!(
            "{SUBTREE_CTE}
             UPDATE entries SET is_shared = ?, share_expires_at = ?, share_root = (? AND id = ?)
             WHERE id IN (SELECT id FROM subtree)"
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(owner_id)
            .bind(is_shared)
            .bind(expires_at)
            .bind(is_shared)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Flip the listed entries to unshared, stamping `expired_at`.
    pub async fn expire_entries(
        &self,
        conn: &mut SqliteConnection,
        owner_id: Uuid,
        ids: &[Uuid],
        expired_at: DateTime<Utc>,
    ) -> TreeResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut builder = QueryBuilder::<Sqlite>::new(
            "UPDATE entries SET is_shared = 0, share_root = 0, share_expires_at = ",
        );
        builder.push_bind(expired_at);
        builder.push(" WHERE owner_id = ");
        builder.push_bind(owner_id);
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }
}

/// Translate constraint failures into store errors.
fn classify(err: sqlx::Error, name: &str) -> TreeError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            TreeError::Conflict(name.to_string())
        }
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => TreeError::ForeignKey,
        sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
            TreeError::Constraint(db_err.message().to_string())
        }
        _ => TreeError::Sqlx(err),
    }
}
