use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::storage::intermediate::Span;

pub fn insert_location(
    conn: &Connection,
    file_id: i64,
    node_id: i64,
    kind: &str,
    span: &Span,
) -> Result<bool> {
    let changed = conn
        .execute(
            r#"
INSERT OR IGNORE INTO source_locations(
  file_id, node_id, kind, start_line, start_column, end_line, end_column
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
"#,
            params![
                file_id,
                node_id,
                kind,
                span.start_line,
                span.start_column,
                span.end_line,
                span.end_column
            ],
        )
        .context("Failed to insert source location")?;
    Ok(changed > 0)
}

pub fn delete_locations_by_file(conn: &Connection, file_id: i64) -> Result<usize> {
    conn.execute(
        "DELETE FROM source_locations WHERE file_id = ?1",
        params![file_id],
    )
    .context("Failed to delete source locations for file")
}

pub fn count_locations(conn: &Connection) -> Result<u64> {
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM source_locations", [], |row| row.get(0))
        .context("Failed to count source locations")?;
    Ok(n.max(0) as u64)
}
