//! Procedural helpers for integration tests.

use anyhow::Result;
use codegraph_indexer::config::{Config, OnInterrupt};
use codegraph_indexer::indexer::command::{IndexerCommand, RefreshMode};
use codegraph_indexer::indexer::frontend::{ParserFrontend, TreeSitterFrontend};
use codegraph_indexer::indexer::pipeline::InterruptHandle;
use codegraph_indexer::storage::intermediate::IntermediateStorage;
use codegraph_indexer::storage::sqlite::{PersistentStore, StoreMode};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Builds a configuration rooted at `base_dir` with test-friendly timing.
pub fn test_config(base_dir: &Path) -> Config {
    let base_dir = base_dir
        .canonicalize()
        .unwrap_or_else(|_| base_dir.to_path_buf());
    let data = base_dir.join(".cgidx");
    Config {
        db_path: data.join("codegraph.db"),
        temp_db_path: data.join("codegraph.db.tmp"),
        shared_data_dir: data.join("shared"),
        user_data_dir: data.join("user"),
        project_settings_path: data.join("project.toml"),
        base_dir,
        index_patterns: vec![
            "**/*.rs".to_string(),
            "**/*.py".to_string(),
            "**/*.go".to_string(),
        ],
        exclude_patterns: vec!["**/.cgidx/**".to_string()],
        parallel_workers: 2,
        multi_process: false,
        worker_binary: None,
        max_worker_restarts: 3,
        storage_provider_threshold: 10,
        poll_interval_ms: 2,
        queue_batch_size: 4,
        refresh_mode: RefreshMode::UpdatedAndIncompleteFiles,
        shallow_index: false,
        on_interrupt: OnInterrupt::Discard,
        compiler_flags: vec![],
        metrics_path: None,
    }
}

pub fn write_file(root: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn open_stable(config: &Config) -> PersistentStore {
    PersistentStore::open(&config.db_path, StoreMode::Read).unwrap()
}

pub fn stored_paths(config: &Config) -> Vec<String> {
    let mut paths: Vec<String> = open_stable(config)
        .file_records()
        .unwrap()
        .into_iter()
        .map(|r| r.path)
        .collect();
    paths.sort();
    paths
}

/// Tree-sitter front-end that panics on files whose name contains "crash"
/// and fails on files whose name contains "broken".
pub struct ScriptedFrontend {
    inner: TreeSitterFrontend,
}

impl ScriptedFrontend {
    pub fn new() -> Self {
        Self {
            inner: TreeSitterFrontend::new(),
        }
    }
}

impl ParserFrontend for ScriptedFrontend {
    fn index(&self, command: &IndexerCommand) -> Result<IntermediateStorage> {
        let name = command
            .source_file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if name.contains("crash") {
            panic!("scripted front-end crash on {name}");
        }
        if name.contains("broken") {
            anyhow::bail!("scripted front-end failure on {name}");
        }
        self.inner.index(command)
    }
}

/// Slow tree-sitter front-end that requests interruption once it has
/// indexed `after` files.
pub struct InterruptingFrontend {
    inner: TreeSitterFrontend,
    handle: InterruptHandle,
    after: usize,
    delay: Duration,
    indexed: AtomicUsize,
}

impl InterruptingFrontend {
    pub fn new(handle: InterruptHandle, after: usize, delay: Duration) -> Self {
        Self {
            inner: TreeSitterFrontend::new(),
            handle,
            after,
            delay,
            indexed: AtomicUsize::new(0),
        }
    }
}

impl ParserFrontend for InterruptingFrontend {
    fn index(&self, command: &IndexerCommand) -> Result<IntermediateStorage> {
        std::thread::sleep(self.delay);
        let storage = self.inner.index(command);
        if self.indexed.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
            self.handle.interrupt();
        }
        storage
    }
}
