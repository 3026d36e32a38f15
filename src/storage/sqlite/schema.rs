use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: i64,
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRow {
    pub id: i64,
    pub node_id: i64,
    pub path: String,
    pub language: String,
    pub modification_time: i64,
    pub content_hash: String,
    pub indexed: bool,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRow {
    pub kind: String,
    pub source_name: String,
    pub target_name: String,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRow {
    pub message: String,
    pub translation_unit: String,
    pub file_path: String,
    pub line: u32,
    pub column: u32,
    pub fatal: bool,
    pub indexed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRunRow {
    pub run_id: String,
    pub started_at_unix_s: i64,
    pub duration_ms: u64,
    pub files_total: u64,
    pub files_indexed: u64,
    pub files_crashed: u64,
    pub error_count: u64,
    pub worker_restarts: u64,
    pub interrupted: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub nodes: u64,
    pub edges: u64,
    pub files: u64,
    pub source_locations: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub nodes: usize,
    pub edges_added: usize,
    pub files: usize,
    pub locations_added: usize,
    pub errors_added: usize,
}

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
  key TEXT PRIMARY KEY NOT NULL,
  value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS nodes (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  kind TEXT NOT NULL,
  name TEXT NOT NULL UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes(kind);

CREATE TABLE IF NOT EXISTS files (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  node_id INTEGER NOT NULL,
  path TEXT NOT NULL UNIQUE,
  language TEXT NOT NULL DEFAULT '',
  modification_time INTEGER NOT NULL DEFAULT 0,
  content_hash TEXT NOT NULL DEFAULT '',
  indexed INTEGER NOT NULL DEFAULT 0,
  complete INTEGER NOT NULL DEFAULT 0,
  updated_at INTEGER NOT NULL DEFAULT (unixepoch())
);

CREATE INDEX IF NOT EXISTS idx_files_node ON files(node_id);

CREATE TABLE IF NOT EXISTS edges (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  kind TEXT NOT NULL,
  source_node_id INTEGER NOT NULL,
  target_node_id INTEGER NOT NULL,
  file_id INTEGER NOT NULL,
  UNIQUE(kind, source_node_id, target_node_id)
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_node_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_node_id);
CREATE INDEX IF NOT EXISTS idx_edges_file ON edges(file_id);

CREATE TABLE IF NOT EXISTS source_locations (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  file_id INTEGER NOT NULL,
  node_id INTEGER NOT NULL,
  kind TEXT NOT NULL,
  start_line INTEGER NOT NULL,
  start_column INTEGER NOT NULL,
  end_line INTEGER NOT NULL,
  end_column INTEGER NOT NULL,
  UNIQUE(file_id, node_id, kind, start_line, start_column, end_line, end_column)
);

CREATE INDEX IF NOT EXISTS idx_source_locations_file ON source_locations(file_id);
CREATE INDEX IF NOT EXISTS idx_source_locations_node ON source_locations(node_id);

CREATE TABLE IF NOT EXISTS errors (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  message TEXT NOT NULL,
  translation_unit TEXT NOT NULL,
  file_path TEXT NOT NULL,
  line INTEGER NOT NULL,
  column_number INTEGER NOT NULL,
  fatal INTEGER NOT NULL DEFAULT 0,
  indexed INTEGER NOT NULL DEFAULT 0,
  UNIQUE(message, translation_unit, file_path, line, column_number)
);

CREATE INDEX IF NOT EXISTS idx_errors_file ON errors(file_path);

CREATE TABLE IF NOT EXISTS index_runs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id TEXT NOT NULL,
  started_at INTEGER NOT NULL,
  duration_ms INTEGER NOT NULL,
  files_total INTEGER NOT NULL,
  files_indexed INTEGER NOT NULL,
  files_crashed INTEGER NOT NULL,
  error_count INTEGER NOT NULL,
  worker_restarts INTEGER NOT NULL,
  interrupted INTEGER NOT NULL DEFAULT 0
);
"#;
