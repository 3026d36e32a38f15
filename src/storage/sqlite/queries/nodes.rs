use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::storage::sqlite::schema::NodeRow;

/// Inserts a node keyed by name and returns its id. A stored unresolved
/// node adopts the incoming kind.
pub fn upsert_node(conn: &Connection, kind: &str, name: &str) -> Result<i64> {
    conn.query_row(
        r#"
INSERT INTO nodes(kind, name)
VALUES (?1, ?2)
ON CONFLICT(name) DO UPDATE SET
  kind = CASE WHEN nodes.kind = 'unresolved' THEN excluded.kind ELSE nodes.kind END
RETURNING id
"#,
        params![kind, name],
        |row| row.get(0),
    )
    .with_context(|| format!("Failed to upsert node {name}"))
}

pub fn delete_node(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM nodes WHERE id = ?1", params![id])
        .context("Failed to delete node")?;
    Ok(())
}

/// Removes symbol nodes nothing refers to anymore.
pub fn prune_orphan_nodes(conn: &Connection) -> Result<usize> {
    conn.execute(
        r#"
DELETE FROM nodes
WHERE kind != 'file'
  AND id NOT IN (SELECT node_id FROM source_locations)
  AND id NOT IN (SELECT source_node_id FROM edges)
  AND id NOT IN (SELECT target_node_id FROM edges)
"#,
        [],
    )
    .context("Failed to prune orphan nodes")
}

pub fn count_nodes(conn: &Connection) -> Result<u64> {
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
        .context("Failed to count nodes")?;
    Ok(n.max(0) as u64)
}

pub fn list_nodes(conn: &Connection) -> Result<Vec<NodeRow>> {
    let mut stmt = conn
        .prepare("SELECT id, kind, name FROM nodes ORDER BY name")
        .context("Failed to prepare list_nodes")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(NodeRow {
                id: row.get(0)?,
                kind: row.get(1)?,
                name: row.get(2)?,
            })
        })
        .context("Failed to query nodes")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("Failed to decode node row")?);
    }
    Ok(out)
}
