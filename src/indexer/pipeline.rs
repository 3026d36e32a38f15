//! Top-level indexing run: prepares the working store, builds the task tree
//! and drives it to completion.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use super::build_index::{BuildIndexSettings, BuildIndexTask, WorkerLauncher};
use super::command::{IndexerCommand, RefreshInfo, RefreshMode};
use super::fill_queue::FillQueueTask;
use super::frontend::{ParserFrontend, TreeSitterFrontend};
use super::keys;
use super::merge::{
    discard_store_task, keep_store_task, working_store, FinishTask, InjectStorageTask,
    MergeStoragesTask, WorkingStore,
};
use super::refresh::compute_refresh_info;
use super::scan::{scan_files, FileFilter};
use super::status::{StatusEvent, StatusSender};
use super::worker::{unix_now_s, ProcessWorkerSpec};
use crate::config::{Config, RunConfig};
use crate::ipc::Coordinator;
use crate::metrics::MetricsRegistry;
use crate::storage::provider::StorageProvider;
use crate::storage::sqlite::{PersistentStore, StoreMode};
use crate::storage::swap;
use crate::task::{
    Blackboard, CheckFlagTask, LambdaTask, ParallelTask, RepeatCondition, RepeatTask,
    SelectorTask, SequenceTask, Task, TaskNode, TaskRunner, TaskState,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexRunReport {
    pub run_id: String,
    pub files_total: u64,
    pub files_indexed: u64,
    pub files_crashed: u64,
    pub errors: u64,
    pub worker_restarts: u64,
    pub interrupted: bool,
    pub store_kept: bool,
    pub store_discarded: bool,
    pub swap_message: Option<String>,
    pub duration_ms: u64,
}

/// Requests a cooperative stop of a running [`IndexingRun`].
#[derive(Clone)]
pub struct InterruptHandle {
    blackboard: Blackboard,
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        tracing::info!("Interruption requested");
        self.blackboard.set(keys::INTERRUPT_REQUESTED, true);
    }

    pub fn is_requested(&self) -> bool {
        self.blackboard.get::<bool>(keys::INTERRUPT_REQUESTED)
    }
}

/// Emits the indexing status around the parallel parse stage.
pub struct ParseWrapperTask {
    child: TaskNode,
    status: StatusSender,
    started: Option<Instant>,
}

impl ParseWrapperTask {
    pub fn new(child: impl Task + 'static, status: StatusSender) -> Self {
        Self {
            child: TaskNode::new(child),
            status,
            started: None,
        }
    }
}

impl Task for ParseWrapperTask {
    fn name(&self) -> &str {
        "parse"
    }

    fn enter(&mut self, _blackboard: &Blackboard) {
        self.started = Some(Instant::now());
        self.status.indexing(true, 0);
    }

    fn update(&mut self, blackboard: &Blackboard) -> TaskState {
        self.child.tick(blackboard)
    }

    fn exit(&mut self, blackboard: &Blackboard) {
        self.child.abort(blackboard);
        let elapsed_ms = self.started.map_or(0, |s| s.elapsed().as_millis() as u64);
        tracing::info!(elapsed_ms, "Parse stage finished");
        self.status.indexing(true, 100);
    }

    fn reset(&mut self, blackboard: &Blackboard) {
        self.child.reset(blackboard);
        self.started = None;
    }

    fn terminate(&mut self) {
        self.child.terminator().terminate();
    }
}

struct PreparedRun {
    refresh: RefreshInfo,
    commands: Vec<IndexerCommand>,
    store: Option<PersistentStore>,
}

pub struct IndexingRun {
    config: Config,
    run: RunConfig,
    frontend: Arc<dyn ParserFrontend>,
    status: StatusSender,
    metrics: Option<Arc<MetricsRegistry>>,
    blackboard: Blackboard,
}

impl IndexingRun {
    pub fn new(config: Config) -> Self {
        let run = config.run_config();
        Self {
            config,
            run,
            frontend: Arc::new(TreeSitterFrontend::new()),
            status: StatusSender::disabled(),
            metrics: None,
            blackboard: Blackboard::new(),
        }
    }

    /// Front-end used by thread workers. Process workers always use the
    /// tree-sitter front-end of the worker binary.
    pub fn with_frontend(mut self, frontend: Arc<dyn ParserFrontend>) -> Self {
        self.frontend = frontend;
        self
    }

    pub fn with_status(mut self, status: StatusSender) -> Self {
        self.status = status;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            blackboard: self.blackboard.clone(),
        }
    }

    /// Scans the project, decides what to index and sets up the working
    /// store. No working store is created when there is nothing to do.
    fn prepare(&self) -> Result<PreparedRun> {
        let config = &self.config;
        let filter = FileFilter::from_config(config)?;
        let scanned = scan_files(&filter, &config.base_dir)?;

        let stable_exists = config.db_path.is_file();
        let reuse_stable = stable_exists && config.refresh_mode != RefreshMode::AllFiles;
        let stored = if stable_exists {
            PersistentStore::open(&config.db_path, StoreMode::Read)?.file_records()?
        } else {
            Vec::new()
        };

        let mut refresh =
            compute_refresh_info(&scanned, &stored, config.refresh_mode, config.shallow_index);
        if !reuse_stable {
            refresh.files_to_clear.clear();
        }
        tracing::info!(
            scanned = scanned.len(),
            to_index = refresh.files_to_index.len(),
            to_clear = refresh.files_to_clear.len(),
            mode = refresh.mode.as_str(),
            "Refresh computed"
        );

        let commands: Vec<IndexerCommand> = refresh
            .files_to_index
            .iter()
            .map(|path| IndexerCommand {
                source_file_path: path.clone(),
                working_directory: config.base_dir.clone(),
                indexed_paths: vec![config.base_dir.clone()],
                exclude_filters: config.exclude_patterns.clone(),
                compiler_flags: config.compiler_flags.clone(),
                shallow: refresh.shallow,
            })
            .collect();

        if refresh.is_noop() && stable_exists {
            return Ok(PreparedRun {
                refresh,
                commands,
                store: None,
            });
        }

        swap::discard(&config.temp_db_path)?;
        if reuse_stable {
            fs::copy(&config.db_path, &config.temp_db_path).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    config.db_path.display(),
                    config.temp_db_path.display()
                )
            })?;
        }
        let mode = if reuse_stable {
            StoreMode::Write
        } else {
            StoreMode::Clear
        };
        let store = PersistentStore::open(&config.temp_db_path, mode)?;
        store.setup()?;

        let to_clear: Vec<PathBuf> = refresh.files_to_clear.iter().cloned().collect();
        if !to_clear.is_empty() {
            let removed = store.remove_files(&to_clear)?;
            tracing::debug!(removed, "Cleared outdated files from working store");
        }

        if config.project_settings_path.is_file() {
            let text = fs::read_to_string(&config.project_settings_path).with_context(|| {
                format!(
                    "Failed to read project settings: {}",
                    config.project_settings_path.display()
                )
            })?;
            store.set_project_settings_text(&text)?;
        }

        Ok(PreparedRun {
            refresh,
            commands,
            store: Some(store),
        })
    }

    fn launcher(&self) -> Result<WorkerLauncher> {
        if self.run.multi_process {
            Ok(WorkerLauncher::Processes(Arc::new(ProcessWorkerSpec {
                binary: self.config.worker_binary()?,
                shared_data_dir: self.config.shared_data_dir.clone(),
                user_data_dir: self.config.user_data_dir.clone(),
            })))
        } else {
            Ok(WorkerLauncher::Threads(self.frontend.clone()))
        }
    }

    fn build_tree(
        &self,
        commands: Vec<IndexerCommand>,
        coordinator: &Arc<Coordinator>,
        store: &WorkingStore,
    ) -> Result<TaskNode> {
        let config = &self.config;
        let poll = config.poll_interval();
        let provider = Arc::new(StorageProvider::new());
        let file_count = commands.len();

        let parse = ParallelTask::new("indexing", poll)
            .with_child(FillQueueTask::new(
                coordinator.clone(),
                commands,
                config.queue_batch_size,
            ))
            .with_child(BuildIndexTask::new(
                coordinator.clone(),
                provider.clone(),
                self.launcher()?,
                BuildIndexSettings {
                    process_count: self.run.process_count,
                    max_restarts: config.max_worker_restarts,
                    poll_interval: poll,
                    provider_threshold: config.storage_provider_threshold,
                    shared_data_dir: config.shared_data_dir.clone(),
                },
                self.status.clone(),
                self.metrics.clone(),
            ))
            .with_child(RepeatTask::new(
                "merge_loop",
                RepeatCondition::WhileSuccess,
                TaskState::Success,
                MergeStoragesTask::new(provider.clone(), self.metrics.clone()),
            ))
            .with_child(RepeatTask::new(
                "inject_loop",
                RepeatCondition::WhileSuccess,
                TaskState::Success,
                InjectStorageTask::new(provider, store.clone(), self.metrics.clone()),
            ));

        let swap = SelectorTask::new("swap_store")
            .with_child(
                SequenceTask::new("keep")
                    .with_child(CheckFlagTask::new(keys::KEEP_STORE, true))
                    .with_child(keep_store_task(
                        self.blackboard.clone(),
                        config.temp_db_path.clone(),
                        config.db_path.clone(),
                        self.status.clone(),
                    )),
            )
            .with_child(
                SequenceTask::new("discard")
                    .with_child(CheckFlagTask::new(keys::DISCARD_STORE, true))
                    .with_child(discard_store_task(
                        self.blackboard.clone(),
                        config.temp_db_path.clone(),
                    )),
            );

        let announce = {
            let status = self.status.clone();
            LambdaTask::new("announce", move || {
                status.message(format!("Indexing {file_count} files"));
            })
        };

        let root = SequenceTask::new("index_project")
            .with_child(announce)
            .with_child(ParseWrapperTask::new(parse, self.status.clone()))
            .with_child(FinishTask::new(
                store.clone(),
                coordinator.clone(),
                config.on_interrupt,
                self.status.clone(),
                self.metrics.clone(),
                unix_now_s(),
            ))
            .with_child(swap);
        Ok(TaskNode::new(root))
    }

    pub fn run(self) -> Result<IndexRunReport> {
        let started = Instant::now();
        let run_id = self.run.run_id.clone();
        tracing::info!(
            run_id = %run_id,
            base_dir = %self.config.base_dir.display(),
            workers = self.run.process_count,
            multi_process = self.run.multi_process,
            "Starting indexing run"
        );

        let prepared = match self.prepare() {
            Ok(p) => p,
            Err(err) => {
                self.status.message(format!("Indexing failed: {err:#}"));
                return Err(err);
            }
        };

        let Some(store) = prepared.store else {
            tracing::info!(mode = prepared.refresh.mode.as_str(), "Index is up to date");
            self.status.send(StatusEvent::Finished {
                interrupted: false,
                files_indexed: 0,
                errors: 0,
            });
            return Ok(IndexRunReport {
                run_id,
                duration_ms: started.elapsed().as_millis() as u64,
                ..IndexRunReport::default()
            });
        };

        let bb = &self.blackboard;
        bb.set(keys::SOURCE_FILE_COUNT, prepared.commands.len() as i64);
        bb.set(keys::INDEXER_COUNT, 0_i64);
        bb.set(keys::MERGING_STORAGES, 0_i64);

        let coordinator = Coordinator::new(run_id.clone(), self.config.queue_batch_size);
        let store = working_store(store);
        let root = self.build_tree(prepared.commands, &coordinator, &store)?;

        let mut runner = TaskRunner::new(root, bb.clone(), self.config.poll_interval());
        let state = runner.run_to_completion();

        if state != TaskState::Success {
            self.abandon(&store);
            self.status.message("Indexing failed; the previous index was left unchanged");
            anyhow::bail!("Indexing pipeline ended with {state:?}");
        }

        let report = IndexRunReport {
            run_id,
            files_total: bb.get::<i64>(keys::SOURCE_FILE_COUNT).max(0) as u64,
            files_indexed: bb.get::<i64>(keys::INDEXED_SOURCE_FILE_COUNT).max(0) as u64,
            files_crashed: bb.get::<i64>(keys::CRASHED_FILE_COUNT).max(0) as u64,
            errors: bb.get::<i64>(keys::ERROR_COUNT).max(0) as u64,
            worker_restarts: coordinator.status().total_restarts(),
            interrupted: bb.get::<bool>(keys::INTERRUPTED_INDEXING),
            store_kept: bb.get::<bool>(keys::STORE_KEPT),
            store_discarded: bb.get::<bool>(keys::STORE_DISCARDED),
            swap_message: bb.try_get::<String>(keys::SWAP_MESSAGE),
            duration_ms: started.elapsed().as_millis() as u64,
        };

        if let (Some(metrics), Some(path)) = (&self.metrics, &self.config.metrics_path) {
            if let Err(err) = metrics.write_to(path) {
                tracing::warn!(path = %path.display(), error = %err, "Failed to write metrics");
            }
        }
        Ok(report)
    }

    pub async fn run_async(self) -> Result<IndexRunReport> {
        tokio::task::spawn_blocking(move || self.run())
            .await
            .context("Indexing task panicked")?
    }

    /// Drops the working store after the tree failed before the swap.
    fn abandon(&self, store: &WorkingStore) {
        let leftover = store.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(store) = leftover {
            if let Err(err) = store.close() {
                tracing::warn!(error = %err, "Failed to close working store");
            }
        }
        if self.blackboard.get::<bool>(keys::STORE_KEPT) {
            return;
        }
        if let Err(err) = swap::discard(&self.config.temp_db_path) {
            tracing::warn!(error = %err, "Failed to remove working store");
        }
    }
}
