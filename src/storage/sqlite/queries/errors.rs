use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::storage::intermediate::StorageError;
use crate::storage::sqlite::schema::ErrorRow;

pub fn insert_error(conn: &Connection, error: &StorageError) -> Result<bool> {
    let changed = conn
        .execute(
            r#"
INSERT OR IGNORE INTO errors(
  message, translation_unit, file_path, line, column_number, fatal, indexed
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
"#,
            params![
                error.message,
                error.translation_unit.to_string_lossy().as_ref(),
                error.file_path.to_string_lossy().as_ref(),
                error.line,
                error.column,
                if error.fatal { 1 } else { 0 },
                if error.indexed { 1 } else { 0 }
            ],
        )
        .context("Failed to insert error")?;
    Ok(changed > 0)
}

/// Drops errors reported in or on behalf of `path`.
pub fn delete_errors_for_path(conn: &Connection, path: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM errors WHERE file_path = ?1 OR translation_unit = ?1",
        params![path],
    )
    .with_context(|| format!("Failed to delete errors for {path}"))
}

pub fn list_errors(conn: &Connection) -> Result<Vec<ErrorRow>> {
    let mut stmt = conn
        .prepare(
            r#"
SELECT message, translation_unit, file_path, line, column_number, fatal, indexed
FROM errors
ORDER BY file_path, line, column_number
"#,
        )
        .context("Failed to prepare list_errors")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ErrorRow {
                message: row.get(0)?,
                translation_unit: row.get(1)?,
                file_path: row.get(2)?,
                line: row.get(3)?,
                column: row.get(4)?,
                fatal: row.get::<_, i64>(5)? != 0,
                indexed: row.get::<_, i64>(6)? != 0,
            })
        })
        .context("Failed to query errors")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("Failed to decode error row")?);
    }
    Ok(out)
}

pub fn count_errors(conn: &Connection) -> Result<u64> {
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM errors", [], |row| row.get(0))
        .context("Failed to count errors")?;
    Ok(n.max(0) as u64)
}
