//! Orchestrator task fanning commands out to worker slots and results back
//! into the storage provider.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::frontend::ParserFrontend;
use super::keys;
use super::status::{percent_complete, StatusSender};
use super::worker::{
    spawn_process_worker, spawn_thread_worker, ProcessWorkerSpec, RunManifest, SlotOutcome,
    SlotSettings,
};
use crate::ipc::{Coordinator, WorkerStatus};
use crate::metrics::MetricsRegistry;
use crate::storage::intermediate::IntermediateStorage;
use crate::storage::provider::StorageProvider;
use crate::task::{Blackboard, Task, TaskState};

/// How worker slots run their workers.
#[derive(Clone)]
pub enum WorkerLauncher {
    Threads(Arc<dyn ParserFrontend>),
    Processes(Arc<ProcessWorkerSpec>),
}

#[derive(Debug, Clone)]
pub struct BuildIndexSettings {
    pub process_count: usize,
    pub max_restarts: u32,
    pub poll_interval: Duration,
    pub provider_threshold: usize,
    pub shared_data_dir: PathBuf,
}

pub struct BuildIndexTask {
    coordinator: Arc<Coordinator>,
    provider: Arc<StorageProvider>,
    launcher: WorkerLauncher,
    settings: BuildIndexSettings,
    status: StatusSender,
    metrics: Option<Arc<MetricsRegistry>>,
    supervisors: Vec<JoinHandle<SlotOutcome>>,
    manifest_path: Option<PathBuf>,
    last_percent: Option<u8>,
    finished: bool,
}

impl BuildIndexTask {
    pub fn new(
        coordinator: Arc<Coordinator>,
        provider: Arc<StorageProvider>,
        launcher: WorkerLauncher,
        settings: BuildIndexSettings,
        status: StatusSender,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        Self {
            coordinator,
            provider,
            launcher,
            settings,
            status,
            metrics,
            supervisors: Vec::new(),
            manifest_path: None,
            last_percent: None,
            finished: false,
        }
    }

    fn slot_settings(&self, worker_id: usize) -> SlotSettings {
        SlotSettings {
            worker_id,
            max_restarts: self.settings.max_restarts,
            poll_interval: self.settings.poll_interval,
            metrics: self.metrics.clone(),
        }
    }

    fn mark_interrupted(&self, blackboard: &Blackboard) {
        self.coordinator.status().set_interrupted(true);
        let dropped = self.coordinator.queue().clear();
        blackboard.set(keys::INTERRUPTED_INDEXING, true);
        tracing::info!(dropped, "Indexing interrupted");
    }

    fn insert_result(&self, storage: IntermediateStorage) {
        self.provider.insert(storage);
        if let Some(m) = &self.metrics {
            m.provider_depth.set(self.provider.count() as f64);
        }
    }

    fn report_progress(&mut self, blackboard: &Blackboard) {
        let status = self.coordinator.status();
        let started = status.take_started_files();
        if !started.is_empty() {
            self.status.current_files(started);
        }
        let total = blackboard.get::<i64>(keys::SOURCE_FILE_COUNT).max(0) as u64;
        let percent = percent_complete(status.processed_file_count(), total);
        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            self.status.indexing(true, percent);
        }
    }
}

impl Task for BuildIndexTask {
    fn name(&self) -> &str {
        "build_index"
    }

    fn enter(&mut self, blackboard: &Blackboard) {
        self.finished = false;
        self.last_percent = None;
        self.coordinator.status().set_interrupted(false);
        blackboard.set(keys::INTERRUPTED_INDEXING, false);

        if let WorkerLauncher::Processes(_) = &self.launcher {
            let manifest = RunManifest::new(self.coordinator.run_id(), self.settings.poll_interval);
            match manifest.write(&self.settings.shared_data_dir) {
                Ok(path) => self.manifest_path = Some(path),
                Err(err) => {
                    tracing::error!(error = %err, "Cannot publish run manifest; workers not started");
                    self.mark_interrupted(blackboard);
                    return;
                }
            }
        }

        let count = self.settings.process_count.max(1);
        for worker_id in 1..=count {
            self.coordinator.status().register(worker_id);
            let settings = self.slot_settings(worker_id);
            let spawned = match &self.launcher {
                WorkerLauncher::Threads(frontend) => {
                    spawn_thread_worker(self.coordinator.clone(), frontend.clone(), settings)
                }
                WorkerLauncher::Processes(spec) => {
                    spawn_process_worker(self.coordinator.clone(), spec.clone(), settings)
                }
            };
            match spawned {
                Ok(handle) => self.supervisors.push(handle),
                Err(err) => {
                    tracing::error!(worker_id, error = %err, "Failed to start worker slot");
                    self.coordinator
                        .status()
                        .set_status(worker_id, WorkerStatus::Crashed);
                }
            }
        }
        blackboard.set(keys::INDEXER_COUNT, count as i64);
        tracing::info!(
            workers = count,
            run_id = self.coordinator.run_id(),
            "Indexer workers started"
        );
    }

    fn update(&mut self, blackboard: &Blackboard) -> TaskState {
        let coordinator = self.coordinator.clone();
        let status = coordinator.status();
        if blackboard.get::<bool>(keys::INTERRUPT_REQUESTED) && !status.is_interrupted() {
            self.mark_interrupted(blackboard);
        }
        if status.is_interrupted() {
            blackboard.set(keys::INTERRUPTED_INDEXING, true);
            self.finished = true;
            return TaskState::Success;
        }

        self.report_progress(blackboard);

        let threshold = self.settings.provider_threshold;
        self.coordinator
            .queue()
            .set_paused(self.provider.count() > threshold);

        let room = threshold.saturating_sub(self.provider.count()).max(1);
        for storage in self.coordinator.drain_results(room) {
            self.insert_result(storage);
        }

        if status.all_terminal() {
            if !self.coordinator.queue().is_drained() && !status.is_interrupted() {
                tracing::error!(
                    pending = self.coordinator.queue().len(),
                    "All workers stopped with commands pending"
                );
                self.mark_interrupted(blackboard);
            }
            self.finished = true;
            return TaskState::Success;
        }
        TaskState::Running
    }

    fn exit(&mut self, blackboard: &Blackboard) {
        if !self.finished {
            self.mark_interrupted(blackboard);
        }
        self.coordinator.queue().set_paused(false);

        for handle in self.supervisors.drain(..) {
            match handle.join() {
                Ok(outcome) => tracing::debug!(?outcome, "Worker slot ended"),
                Err(_) => tracing::error!("Worker supervisor panicked"),
            }
        }

        for storage in self.coordinator.drain_results(usize::MAX) {
            self.insert_result(storage);
        }

        let crashed = self.coordinator.status().take_crashed_files();
        for file in &crashed {
            tracing::warn!(file = %file.display(), "Recording crashed translation unit");
            self.insert_result(IntermediateStorage::for_crashed_file(file));
        }

        if let Some(path) = self.manifest_path.take() {
            if let Err(err) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %err, "Failed to remove run manifest");
            }
        }

        let status = self.coordinator.status();
        let indexed = status.finished_file_count();
        if let Some(m) = &self.metrics {
            m.files_indexed.inc_by(indexed as f64);
            m.files_failed.inc_by(crashed.len() as f64);
        }
        if status.is_interrupted() {
            blackboard.set(keys::INTERRUPTED_INDEXING, true);
        }
        blackboard.set(keys::INDEXED_SOURCE_FILE_COUNT, indexed as i64);
        blackboard.set(keys::CRASHED_FILE_COUNT, crashed.len() as i64);
        tracing::info!(
            indexed,
            crashed = crashed.len(),
            restarts = status.total_restarts(),
            "Indexer workers stopped"
        );
        // Last: the merge and inject loops treat zero as "no more results".
        blackboard.set(keys::INDEXER_COUNT, 0_i64);
    }

    fn reset(&mut self, _blackboard: &Blackboard) {
        self.supervisors.clear();
        self.manifest_path = None;
        self.last_percent = None;
        self.finished = false;
    }

    fn terminate(&mut self) {
        self.coordinator.status().set_interrupted(true);
        self.coordinator.queue().clear();
    }
}
