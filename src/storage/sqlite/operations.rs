use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::queries;
use super::schema::{MergeStats, SCHEMA_SQL, SCHEMA_VERSION};
use crate::storage::intermediate::IntermediateStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Read,
    Write,
    /// Write access to a store whose previous content is dropped on setup.
    Clear,
}

pub struct PersistentStore {
    pub(crate) conn: Mutex<Connection>,
    path: PathBuf,
    mode: StoreMode,
}

impl PersistentStore {
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn open(db_path: &Path, mode: StoreMode) -> Result<Self> {
        let conn = match mode {
            StoreMode::Read => Connection::open_with_flags(
                db_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_context(|| format!("Failed to open sqlite db read-only: {}", db_path.display()))?,
            StoreMode::Write | StoreMode::Clear => {
                if let Some(parent) = db_path.parent() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create db parent dir: {}", parent.display())
                    })?;
                }
                let conn = Connection::open(db_path)
                    .with_context(|| format!("Failed to open sqlite db: {}", db_path.display()))?;
                conn.execute_batch(
                    "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;",
                )
                .context("Failed to configure journal mode")?;
                conn
            }
        };
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .context("Failed to set busy timeout")?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: db_path.to_path_buf(),
            mode,
        })
    }

    pub fn from_connection(conn: Connection, mode: StoreMode) -> Self {
        Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
            mode,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.mode == StoreMode::Read {
            bail!("store {} is opened read-only", self.path.display());
        }
        Ok(())
    }

    /// Creates the schema. In clear mode all previous content is removed.
    pub fn setup(&self) -> Result<()> {
        if self.mode == StoreMode::Read {
            return Ok(());
        }
        let conn = self.conn();
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize sqlite schema")?;
        queries::meta::set_meta(&conn, queries::meta::SCHEMA_VERSION_KEY, SCHEMA_VERSION)?;
        drop(conn);
        if self.mode == StoreMode::Clear {
            self.clear_all()?;
        }
        Ok(())
    }

    pub fn clear_all(&self) -> Result<()> {
        self.ensure_writable()?;
        self.conn()
            .execute_batch(
                r#"
DELETE FROM source_locations;
DELETE FROM edges;
DELETE FROM errors;
DELETE FROM files;
DELETE FROM nodes;
"#,
            )
            .context("Failed to clear sqlite tables")?;
        Ok(())
    }

    /// Writes an intermediate storage into the store in one transaction.
    pub fn merge(&self, storage: &IntermediateStorage) -> Result<MergeStats> {
        self.ensure_writable()?;
        let mut conn = self.conn();
        let tx = conn.transaction().context("Failed to begin merge transaction")?;
        let mut stats = MergeStats::default();

        let mut node_ids: HashMap<u64, i64> = HashMap::with_capacity(storage.nodes().len());
        for node in storage.nodes() {
            let id = queries::nodes::upsert_node(&tx, node.kind.as_str(), &node.name)?;
            node_ids.insert(node.id, id);
            stats.nodes += 1;
        }

        let mut file_ids: HashMap<u64, i64> = HashMap::with_capacity(storage.files().len());
        for file in storage.files() {
            let Some(&node_id) = node_ids.get(&file.id) else {
                bail!("file {} has no node", file.path.display());
            };
            let id = queries::files::upsert_file(&tx, node_id, file)?;
            file_ids.insert(file.id, id);
            stats.files += 1;
        }

        for edge in storage.edges() {
            let (Some(&source), Some(&target)) =
                (node_ids.get(&edge.source_id), node_ids.get(&edge.target_id))
            else {
                tracing::warn!(kind = edge.kind.as_str(), "Skipping edge with unknown endpoint");
                continue;
            };
            let file_id = file_ids.get(&edge.file_id).copied().unwrap_or(0);
            if queries::edges::insert_edge(&tx, edge.kind.as_str(), source, target, file_id)? {
                stats.edges_added += 1;
            }
        }

        for loc in storage.locations() {
            let (Some(&file_id), Some(&node_id)) =
                (file_ids.get(&loc.file_id), node_ids.get(&loc.element_id))
            else {
                tracing::warn!("Skipping source location with unknown file or element");
                continue;
            };
            if queries::locations::insert_location(
                &tx,
                file_id,
                node_id,
                loc.kind.as_str(),
                &loc.span,
            )? {
                stats.locations_added += 1;
            }
        }

        for err in storage.errors() {
            if queries::errors::insert_error(&tx, err)? {
                stats.errors_added += 1;
            }
        }

        tx.commit().context("Failed to commit merge transaction")?;
        Ok(stats)
    }

    /// Removes everything recorded for the given files. Returns the number of
    /// files that were present.
    pub fn remove_files(&self, paths: &[PathBuf]) -> Result<usize> {
        self.ensure_writable()?;
        let mut conn = self.conn();
        let tx = conn.transaction().context("Failed to begin removal transaction")?;
        let mut removed = 0;
        for path in paths {
            let path = path.to_string_lossy();
            queries::errors::delete_errors_for_path(&tx, &path)?;
            let Some(file) = queries::files::get_file_by_path(&tx, &path)? else {
                continue;
            };
            queries::locations::delete_locations_by_file(&tx, file.id)?;
            queries::edges::delete_edges_by_file(&tx, file.id)?;
            queries::files::delete_file(&tx, file.id)?;
            queries::nodes::delete_node(&tx, file.node_id)?;
            removed += 1;
        }
        let pruned = queries::nodes::prune_orphan_nodes(&tx)?;
        tx.commit().context("Failed to commit removal transaction")?;
        tracing::debug!(removed, pruned, "Removed files from store");
        Ok(removed)
    }

    /// Folds the WAL into the main file and leaves the store in rollback
    /// journal mode, so the file can be moved without sidecars.
    pub fn checkpoint(&self) -> Result<()> {
        if self.mode == StoreMode::Read {
            return Ok(());
        }
        self.conn()
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE); PRAGMA journal_mode=DELETE;")
            .with_context(|| format!("Failed to checkpoint {}", self.path.display()))?;
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.checkpoint()?;
        let path = self.path.clone();
        let conn = self.conn.into_inner().unwrap_or_else(|e| e.into_inner());
        conn.close()
            .map_err(|(_, err)| err)
            .with_context(|| format!("Failed to close {}", path.display()))
    }
}
