//! libSQL storage layer for indexed entries (offline mode).
//!
//! The [`Storage`] struct persists the entry index as three tables:
//! `entry_metadata` (id → metadata JSON), `path_index` (path → id) and
//! `entry_content` (id → content + hash). Every write runs in one transaction,
//! so the three tables never disagree.
//!
//! **Access rules:**
//! - `docpipe ingest`: read-write (sole writer) via [`Storage::open`]
//! - `docpipe resolve` / `list`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use tracing::{debug, instrument};

use docpipe_shared::{DocpipeError, Entry, EntryId, Metadata, Result, content_hash};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("readonly", &self.readonly)
            .finish_non_exhaustive()
    }
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocpipeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DocpipeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DocpipeError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DocpipeError::Storage(format!(
                "database {} does not exist; run `docpipe ingest` first",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DocpipeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DocpipeError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        DocpipeError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(DocpipeError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Entry operations
    // -----------------------------------------------------------------------

    /// Insert or replace one entry across all three tables.
    ///
    /// Any other row mapping the same path, or a stale path for the same id,
    /// is removed in the same transaction.
    #[instrument(skip_all, fields(id = %entry.id, path = %entry.path))]
    pub async fn upsert_entry(&self, entry: &Entry) -> Result<()> {
        self.check_writable()?;
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DocpipeError::Storage(e.to_string()))?;

        write_entry(&tx, entry).await?;

        tx.commit()
            .await
            .map_err(|e| DocpipeError::Storage(e.to_string()))?;
        debug!("entry persisted");
        Ok(())
    }

    /// Delete an entry by id. Returns `false` if it was not stored.
    #[instrument(skip(self))]
    pub async fn delete_entry(&self, id: EntryId) -> Result<bool> {
        self.check_writable()?;
        let id = id.to_string();
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DocpipeError::Storage(e.to_string()))?;

        let removed = tx
            .execute("DELETE FROM path_index WHERE entry_id = ?1", params![id.as_str()])
            .await
            .map_err(|e| DocpipeError::Storage(e.to_string()))?;
        tx.execute("DELETE FROM entry_metadata WHERE entry_id = ?1", params![id.as_str()])
            .await
            .map_err(|e| DocpipeError::Storage(e.to_string()))?;
        tx.execute("DELETE FROM entry_content WHERE entry_id = ?1", params![id.as_str()])
            .await
            .map_err(|e| DocpipeError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| DocpipeError::Storage(e.to_string()))?;
        Ok(removed > 0)
    }

    /// Get one entry by id.
    pub async fn get_entry(&self, id: EntryId) -> Result<Option<Entry>> {
        let id = id.to_string();
        let mut rows = self
            .conn
            .query(
                "SELECT p.entry_id, p.path, c.content, m.metadata_json
                 FROM path_index p
                 JOIN entry_content c ON c.entry_id = p.entry_id
                 JOIN entry_metadata m ON m.entry_id = p.entry_id
                 WHERE p.entry_id = ?1",
                params![id.as_str()],
            )
            .await
            .map_err(|e| DocpipeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_entry(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DocpipeError::Storage(e.to_string())),
        }
    }

    /// All stored entries, ordered by path.
    pub async fn list_entries(&self) -> Result<Vec<Entry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT p.entry_id, p.path, c.content, m.metadata_json
                 FROM path_index p
                 JOIN entry_content c ON c.entry_id = p.entry_id
                 JOIN entry_metadata m ON m.entry_id = p.entry_id
                 ORDER BY p.path",
                params![],
            )
            .await
            .map_err(|e| DocpipeError::Storage(e.to_string()))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DocpipeError::Storage(e.to_string()))?
        {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }

    /// Number of stored entries.
    pub async fn count_entries(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM path_index", params![])
            .await
            .map_err(|e| DocpipeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|n| n.max(0) as u64)
                .map_err(|e| DocpipeError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(DocpipeError::Storage(e.to_string())),
        }
    }

    /// Replace the whole stored index with `entries` in one transaction.
    #[instrument(skip_all, fields(count = entries.len()))]
    pub async fn replace_all(&self, entries: &[Entry]) -> Result<usize> {
        self.check_writable()?;
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DocpipeError::Storage(e.to_string()))?;

        tx.execute_batch(
            "DELETE FROM path_index; DELETE FROM entry_metadata; DELETE FROM entry_content;",
        )
        .await
        .map_err(|e| DocpipeError::Storage(e.to_string()))?;

        for entry in entries {
            write_entry(&tx, entry).await?;
        }

        tx.commit()
            .await
            .map_err(|e| DocpipeError::Storage(e.to_string()))?;
        debug!("index snapshot persisted");
        Ok(entries.len())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Write one entry's rows on an open transaction.
async fn write_entry(conn: &Connection, entry: &Entry) -> Result<()> {
    let id = entry.id.to_string();
    let metadata_json = serde_json::to_string(&entry.metadata)
        .map_err(|e| DocpipeError::Storage(format!("metadata serialization failed: {e}")))?;
    let hash = entry
        .metadata
        .get("content_hash")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| content_hash(&entry.content));
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "DELETE FROM path_index WHERE entry_id = ?1 OR path = ?2",
        params![id.as_str(), entry.path.as_str()],
    )
    .await
    .map_err(|e| DocpipeError::Storage(e.to_string()))?;

    conn.execute(
        "INSERT INTO path_index (path, entry_id) VALUES (?1, ?2)",
        params![entry.path.as_str(), id.as_str()],
    )
    .await
    .map_err(|e| DocpipeError::Storage(e.to_string()))?;

    conn.execute(
        "INSERT OR REPLACE INTO entry_metadata (entry_id, metadata_json, updated_at)
         VALUES (?1, ?2, ?3)",
        params![id.as_str(), metadata_json.as_str(), now.as_str()],
    )
    .await
    .map_err(|e| DocpipeError::Storage(e.to_string()))?;

    conn.execute(
        "INSERT OR REPLACE INTO entry_content (entry_id, content, content_hash)
         VALUES (?1, ?2, ?3)",
        params![id.as_str(), entry.content.as_str(), hash.as_str()],
    )
    .await
    .map_err(|e| DocpipeError::Storage(e.to_string()))?;

    // Rows of an entry whose path was just taken over are now unreachable.
    conn.execute(
        "DELETE FROM entry_metadata WHERE entry_id NOT IN (SELECT entry_id FROM path_index)",
        params![],
    )
    .await
    .map_err(|e| DocpipeError::Storage(e.to_string()))?;
    conn.execute(
        "DELETE FROM entry_content WHERE entry_id NOT IN (SELECT entry_id FROM path_index)",
        params![],
    )
    .await
    .map_err(|e| DocpipeError::Storage(e.to_string()))?;

    Ok(())
}

/// Convert a `(entry_id, path, content, metadata_json)` row to an [`Entry`].
fn row_to_entry(row: &libsql::Row) -> Result<Entry> {
    let id: String = row
        .get(0)
        .map_err(|e| DocpipeError::Storage(e.to_string()))?;
    let path: String = row
        .get(1)
        .map_err(|e| DocpipeError::Storage(e.to_string()))?;
    let content: String = row
        .get(2)
        .map_err(|e| DocpipeError::Storage(e.to_string()))?;
    let metadata_json: String = row
        .get(3)
        .map_err(|e| DocpipeError::Storage(e.to_string()))?;

    let id: EntryId = id
        .parse()
        .map_err(|e| DocpipeError::Storage(format!("invalid entry id {id:?}: {e}")))?;
    let metadata: Metadata = serde_json::from_str(&metadata_json)
        .map_err(|e| DocpipeError::Storage(format!("invalid metadata for {id}: {e}")))?;

    Ok(Entry {
        id,
        path,
        content,
        metadata,
    })
}
