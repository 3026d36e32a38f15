//! Coordination between the orchestrator and its workers for one run.

pub mod command_queue;
pub mod link;
pub mod protocol;
pub mod results;
pub mod status;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::storage::intermediate::IntermediateStorage;

pub use command_queue::{CommandQueue, Pop};
pub use link::{LocalLink, PipeLink, WorkerLink};
pub use results::ResultManager;
pub use status::{StatusManager, WorkerStatus};

/// Run-scoped context shared by the orchestrator and every worker slot.
pub struct Coordinator {
    run_id: String,
    queue: CommandQueue,
    status: StatusManager,
    results: Mutex<BTreeMap<usize, Arc<ResultManager>>>,
}

impl Coordinator {
    pub fn new(run_id: impl Into<String>, queue_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            run_id: run_id.into(),
            queue: CommandQueue::new(queue_capacity),
            status: StatusManager::new(),
            results: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn status(&self) -> &StatusManager {
        &self.status
    }

    /// Pops the next command for a worker and records its file as in flight
    /// in the same step, so a worker lost after this call still accounts for
    /// the file.
    pub fn dispatch(&self, worker_id: usize) -> Pop {
        let popped = self.queue.pop();
        if let Pop::Command(command) = &popped {
            self.status.start_file(worker_id, &command.source_file_path);
        }
        popped
    }

    fn results(&self) -> MutexGuard<'_, BTreeMap<usize, Arc<ResultManager>>> {
        self.results.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn results_for(&self, worker_id: usize) -> Arc<ResultManager> {
        self.results().entry(worker_id).or_default().clone()
    }

    /// Collects up to `limit` completed results, taking the largest of each
    /// worker in turn.
    pub fn drain_results(&self, limit: usize) -> Vec<IntermediateStorage> {
        let managers: Vec<Arc<ResultManager>> = self.results().values().cloned().collect();
        let mut out = Vec::new();
        loop {
            let before = out.len();
            for manager in &managers {
                if out.len() >= limit {
                    return out;
                }
                if let Some(storage) = manager.pop_largest() {
                    out.push(storage);
                }
            }
            if out.len() == before {
                return out;
            }
        }
    }

    pub fn pending_results(&self) -> usize {
        self.results().values().map(|m| m.len()).sum()
    }
}
