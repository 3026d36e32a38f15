use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::storage::sqlite::schema::EdgeRow;

/// Returns true when the edge was not stored before.
pub fn insert_edge(
    conn: &Connection,
    kind: &str,
    source_node_id: i64,
    target_node_id: i64,
    file_id: i64,
) -> Result<bool> {
    let changed = conn
        .execute(
            r#"
INSERT OR IGNORE INTO edges(kind, source_node_id, target_node_id, file_id)
VALUES (?1, ?2, ?3, ?4)
"#,
            params![kind, source_node_id, target_node_id, file_id],
        )
        .context("Failed to insert edge")?;
    Ok(changed > 0)
}

pub fn delete_edges_by_file(conn: &Connection, file_id: i64) -> Result<usize> {
    conn.execute("DELETE FROM edges WHERE file_id = ?1", params![file_id])
        .context("Failed to delete edges for file")
}

pub fn count_edges(conn: &Connection) -> Result<u64> {
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))
        .context("Failed to count edges")?;
    Ok(n.max(0) as u64)
}

pub fn list_edges(conn: &Connection) -> Result<Vec<EdgeRow>> {
    let mut stmt = conn
        .prepare(
            r#"
SELECT e.kind, s.name, t.name, f.path
FROM edges e
JOIN nodes s ON s.id = e.source_node_id
JOIN nodes t ON t.id = e.target_node_id
LEFT JOIN files f ON f.id = e.file_id
ORDER BY s.name, t.name, e.kind
"#,
        )
        .context("Failed to prepare list_edges")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(EdgeRow {
                kind: row.get(0)?,
                source_name: row.get(1)?,
                target_name: row.get(2)?,
                file_path: row.get(3)?,
            })
        })
        .context("Failed to query edges")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("Failed to decode edge row")?);
    }
    Ok(out)
}
