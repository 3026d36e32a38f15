use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

pub const PROJECT_SETTINGS_KEY: &str = "project_settings";
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO meta(key, value)
VALUES (?1, ?2)
ON CONFLICT(key) DO UPDATE SET value=excluded.value
"#,
        params![key, value],
    )
    .with_context(|| format!("Failed to set meta value {key}"))?;
    Ok(())
}

pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM meta WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("Failed to query meta value {key}"))
}
