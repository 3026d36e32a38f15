use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::storage::sqlite::schema::IndexRunRow;

pub fn insert_index_run(conn: &Connection, run: &IndexRunRow) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO index_runs(
  run_id, started_at, duration_ms, files_total, files_indexed, files_crashed,
  error_count, worker_restarts, interrupted
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
"#,
        params![
            run.run_id,
            run.started_at_unix_s,
            run.duration_ms as i64,
            run.files_total as i64,
            run.files_indexed as i64,
            run.files_crashed as i64,
            run.error_count as i64,
            run.worker_restarts as i64,
            if run.interrupted { 1 } else { 0 }
        ],
    )
    .context("Failed to insert index run")?;
    Ok(())
}

pub fn latest_index_run(conn: &Connection) -> Result<Option<IndexRunRow>> {
    conn.query_row(
        r#"
SELECT
  run_id, started_at, duration_ms, files_total, files_indexed, files_crashed,
  error_count, worker_restarts, interrupted
FROM index_runs
ORDER BY started_at DESC, id DESC
LIMIT 1
"#,
        [],
        |row| {
            Ok(IndexRunRow {
                run_id: row.get(0)?,
                started_at_unix_s: row.get(1)?,
                duration_ms: u64::try_from(row.get::<_, i64>(2)?).unwrap_or(0),
                files_total: u64::try_from(row.get::<_, i64>(3)?).unwrap_or(0),
                files_indexed: u64::try_from(row.get::<_, i64>(4)?).unwrap_or(0),
                files_crashed: u64::try_from(row.get::<_, i64>(5)?).unwrap_or(0),
                error_count: u64::try_from(row.get::<_, i64>(6)?).unwrap_or(0),
                worker_restarts: u64::try_from(row.get::<_, i64>(7)?).unwrap_or(0),
                interrupted: row.get::<_, i64>(8)? != 0,
            })
        },
    )
    .optional()
    .context("Failed to query latest index run")
}
