//! Folding worker results into the working store and promoting or dropping
//! that store at the end of a run.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use super::keys;
use super::status::{StatusEvent, StatusSender};
use crate::config::OnInterrupt;
use crate::ipc::Coordinator;
use crate::metrics::MetricsRegistry;
use crate::storage::provider::StorageProvider;
use crate::storage::sqlite::{IndexRunRow, PersistentStore};
use crate::storage::swap;
use crate::task::{Blackboard, LambdaTask, Task, TaskState};

/// The store being written during a run. Taken out and closed by the finish
/// step before the file swap.
pub type WorkingStore = Arc<Mutex<Option<PersistentStore>>>;

pub fn working_store(store: PersistentStore) -> WorkingStore {
    Arc::new(Mutex::new(Some(store)))
}

fn lock_store(store: &WorkingStore) -> MutexGuard<'_, Option<PersistentStore>> {
    store.lock().unwrap_or_else(|e| e.into_inner())
}

fn workers_active(blackboard: &Blackboard) -> bool {
    blackboard.get::<i64>(keys::INDEXER_COUNT) > 0
}

/// Combines the two largest pending results into one, in memory.
///
/// Success after each merge, Running while fewer than two results are
/// pending and workers are still attached, Failure once workers are gone.
pub struct MergeStoragesTask {
    provider: Arc<StorageProvider>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl MergeStoragesTask {
    pub fn new(provider: Arc<StorageProvider>, metrics: Option<Arc<MetricsRegistry>>) -> Self {
        Self { provider, metrics }
    }
}

impl Task for MergeStoragesTask {
    fn name(&self) -> &str {
        "merge_storages"
    }

    fn update(&mut self, blackboard: &Blackboard) -> TaskState {
        blackboard.update::<i64, _>(keys::MERGING_STORAGES, |n| n + 1);
        let state = match self.provider.consume_two_largest() {
            Ok((mut first, second)) => {
                first.merge(second);
                self.provider.insert(first);
                if let Some(m) = &self.metrics {
                    m.storages_merged.inc();
                }
                TaskState::Success
            }
            Err(_) if workers_active(blackboard) => TaskState::Running,
            Err(_) => TaskState::Failure,
        };
        blackboard.update::<i64, _>(keys::MERGING_STORAGES, |n| n - 1);
        state
    }
}

/// Writes the largest pending result into the working store.
///
/// Failure only once no worker is attached, no merge is in progress and the
/// provider is empty, so nothing that was received is left behind.
pub struct InjectStorageTask {
    provider: Arc<StorageProvider>,
    store: WorkingStore,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl InjectStorageTask {
    pub fn new(
        provider: Arc<StorageProvider>,
        store: WorkingStore,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        Self {
            provider,
            store,
            metrics,
        }
    }
}

impl Task for InjectStorageTask {
    fn name(&self) -> &str {
        "inject_storage"
    }

    fn update(&mut self, blackboard: &Blackboard) -> TaskState {
        let storage = match self.provider.consume_largest() {
            Ok(storage) => storage,
            Err(_) => {
                if workers_active(blackboard) || blackboard.get::<i64>(keys::MERGING_STORAGES) > 0 {
                    return TaskState::Running;
                }
                if let Some(m) = &self.metrics {
                    m.provider_depth.set(self.provider.count() as f64);
                }
                return if self.provider.is_empty() {
                    TaskState::Failure
                } else {
                    TaskState::Success
                };
            }
        };

        if let Some(m) = &self.metrics {
            m.provider_depth.set(self.provider.count() as f64);
        }

        let guard = lock_store(&self.store);
        let Some(store) = guard.as_ref() else {
            tracing::error!("Working store already closed; dropping result");
            blackboard.set(keys::STORE_ERROR, true);
            return TaskState::Success;
        };
        match store.merge(&storage) {
            Ok(stats) => {
                tracing::debug!(
                    nodes = stats.nodes,
                    files = stats.files,
                    errors = stats.errors_added,
                    "Injected storage"
                );
                if let Some(m) = &self.metrics {
                    m.storages_injected.inc();
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to write result into working store");
                blackboard.set(keys::STORE_ERROR, true);
            }
        }
        TaskState::Success
    }
}

/// Closes the working store, records the run, and decides whether the
/// working store is kept or discarded.
pub struct FinishTask {
    store: WorkingStore,
    coordinator: Arc<Coordinator>,
    on_interrupt: OnInterrupt,
    status: StatusSender,
    metrics: Option<Arc<MetricsRegistry>>,
    started: Instant,
    started_at_unix_s: i64,
}

impl FinishTask {
    pub fn new(
        store: WorkingStore,
        coordinator: Arc<Coordinator>,
        on_interrupt: OnInterrupt,
        status: StatusSender,
        metrics: Option<Arc<MetricsRegistry>>,
        started_at_unix_s: i64,
    ) -> Self {
        Self {
            store,
            coordinator,
            on_interrupt,
            status,
            metrics,
            started: Instant::now(),
            started_at_unix_s,
        }
    }

    fn close_store(&self, blackboard: &Blackboard, run: &IndexRunRow) -> u64 {
        let Some(store) = lock_store(&self.store).take() else {
            tracing::error!("Working store missing at end of run");
            blackboard.set(keys::STORE_ERROR, true);
            return 0;
        };
        let errors = match store.counts() {
            Ok(counts) => counts.errors,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to count stored errors");
                0
            }
        };
        let run = IndexRunRow {
            error_count: errors,
            ..run.clone()
        };
        if let Err(err) = store.insert_index_run(&run) {
            tracing::warn!(error = %err, "Failed to record index run");
        }
        if let Err(err) = store.close() {
            tracing::error!(error = %err, "Failed to close working store");
            blackboard.set(keys::STORE_ERROR, true);
        }
        errors
    }
}

impl Task for FinishTask {
    fn name(&self) -> &str {
        "finish_indexing"
    }

    fn update(&mut self, blackboard: &Blackboard) -> TaskState {
        let elapsed = self.started.elapsed();
        let interrupted = blackboard.get::<bool>(keys::INTERRUPTED_INDEXING);
        let files_indexed = blackboard.get::<i64>(keys::INDEXED_SOURCE_FILE_COUNT).max(0) as u64;
        let run = IndexRunRow {
            run_id: self.coordinator.run_id().to_string(),
            started_at_unix_s: self.started_at_unix_s,
            duration_ms: elapsed.as_millis() as u64,
            files_total: blackboard.get::<i64>(keys::SOURCE_FILE_COUNT).max(0) as u64,
            files_indexed,
            files_crashed: blackboard.get::<i64>(keys::CRASHED_FILE_COUNT).max(0) as u64,
            error_count: 0,
            worker_restarts: self.coordinator.status().total_restarts(),
            interrupted,
        };
        let errors = self.close_store(blackboard, &run);

        blackboard.set(keys::ERROR_COUNT, errors as i64);
        blackboard.set(keys::INDEX_TIME, elapsed.as_secs_f64());
        if let Some(m) = &self.metrics {
            m.run_duration.observe(elapsed.as_secs_f64());
        }

        let keep = !blackboard.get::<bool>(keys::STORE_ERROR)
            && (!interrupted || self.on_interrupt == OnInterrupt::Keep);
        blackboard.set(keys::KEEP_STORE, keep);
        blackboard.set(keys::DISCARD_STORE, !keep);

        self.status.indexing(false, 100);
        self.status.send(StatusEvent::Finished {
            interrupted,
            files_indexed,
            errors,
        });
        tracing::info!(
            files_indexed,
            errors,
            interrupted,
            keep,
            elapsed_ms = run.duration_ms,
            "Indexing finished"
        );
        TaskState::Success
    }
}

/// Promotes the working store. On conflict the working store stays where it
/// is and the user gets a message.
pub fn keep_store_task(
    blackboard: Blackboard,
    working: PathBuf,
    stable: PathBuf,
    status: StatusSender,
) -> LambdaTask {
    LambdaTask::new("keep_store", move || match swap::keep(&working, &stable) {
        Ok(()) => blackboard.set(keys::STORE_KEPT, true),
        Err(err) => {
            let message = err.user_message(&working);
            tracing::error!(error = %err, "Failed to replace index store");
            status.message(message.clone());
            blackboard.set(keys::SWAP_MESSAGE, message);
        }
    })
}

pub fn discard_store_task(blackboard: Blackboard, working: PathBuf) -> LambdaTask {
    LambdaTask::new("discard_store", move || match swap::discard(&working) {
        Ok(()) => blackboard.set(keys::STORE_DISCARDED, true),
        Err(err) => {
            tracing::error!(error = %err, "Failed to discard working store");
            blackboard.set(keys::SWAP_MESSAGE, err.user_message(&working));
        }
    })
}
