use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::storage::intermediate::StorageFile;
use crate::storage::sqlite::schema::FileRow;

fn file_row(row: &Row<'_>) -> rusqlite::Result<FileRow> {
    Ok(FileRow {
        id: row.get(0)?,
        node_id: row.get(1)?,
        path: row.get(2)?,
        language: row.get(3)?,
        modification_time: row.get(4)?,
        content_hash: row.get(5)?,
        indexed: row.get::<_, i64>(6)? != 0,
        complete: row.get::<_, i64>(7)? != 0,
    })
}

/// Records a file. An empty hash leaves the stored metadata in place, which
/// happens for files that only appear through a crash report.
pub fn upsert_file(conn: &Connection, node_id: i64, file: &StorageFile) -> Result<i64> {
    let path = file.path.to_string_lossy();
    conn.query_row(
        r#"
INSERT INTO files(node_id, path, language, modification_time, content_hash, indexed, complete, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, unixepoch())
ON CONFLICT(path) DO UPDATE SET
  node_id=excluded.node_id,
  language=CASE WHEN excluded.content_hash = '' THEN files.language ELSE excluded.language END,
  modification_time=CASE WHEN excluded.content_hash = '' THEN files.modification_time ELSE excluded.modification_time END,
  content_hash=CASE WHEN excluded.content_hash = '' THEN files.content_hash ELSE excluded.content_hash END,
  indexed=excluded.indexed,
  complete=excluded.complete,
  updated_at=unixepoch()
RETURNING id
"#,
        params![
            node_id,
            path.as_ref(),
            file.language,
            file.modification_time,
            file.content_hash,
            if file.indexed { 1 } else { 0 },
            if file.complete { 1 } else { 0 }
        ],
        |row| row.get(0),
    )
    .with_context(|| format!("Failed to upsert file {path}"))
}

pub fn get_file_by_path(conn: &Connection, path: &str) -> Result<Option<FileRow>> {
    conn.query_row(
        r#"
SELECT id, node_id, path, language, modification_time, content_hash, indexed, complete
FROM files
WHERE path = ?1
"#,
        params![path],
        file_row,
    )
    .optional()
    .with_context(|| format!("Failed to query file {path}"))
}

pub fn list_files(conn: &Connection) -> Result<Vec<FileRow>> {
    let mut stmt = conn
        .prepare(
            r#"
SELECT id, node_id, path, language, modification_time, content_hash, indexed, complete
FROM files
ORDER BY path
"#,
        )
        .context("Failed to prepare list_files")?;
    let rows = stmt.query_map([], file_row).context("Failed to query files")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("Failed to decode file row")?);
    }
    Ok(out)
}

pub fn delete_file(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM files WHERE id = ?1", params![id])
        .context("Failed to delete file")?;
    Ok(())
}

pub fn count_files(conn: &Connection) -> Result<u64> {
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
        .context("Failed to count files")?;
    Ok(n.max(0) as u64)
}
