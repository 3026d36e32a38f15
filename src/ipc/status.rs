use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    NotStarted,
    Running,
    Finished,
    Crashed,
}

impl WorkerStatus {
    fn rank(self) -> u8 {
        match self {
            WorkerStatus::NotStarted => 0,
            WorkerStatus::Running => 1,
            WorkerStatus::Finished | WorkerStatus::Crashed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }
}

#[derive(Debug, Clone)]
struct Slot {
    status: WorkerStatus,
    in_flight: Vec<PathBuf>,
    restarts: u32,
}

#[derive(Default)]
struct StatusState {
    slots: BTreeMap<usize, Slot>,
    crashed_files: Vec<PathBuf>,
    started_files: Vec<PathBuf>,
}

/// Liveness and progress of every worker slot in a run.
#[derive(Default)]
pub struct StatusManager {
    state: Mutex<StatusState>,
    interrupted: AtomicBool,
    finished_files: AtomicU64,
    crashed_file_count: AtomicU64,
}

impl StatusManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StatusState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, worker_id: usize) {
        self.lock().slots.entry(worker_id).or_insert(Slot {
            status: WorkerStatus::NotStarted,
            in_flight: Vec::new(),
            restarts: 0,
        });
    }

    pub fn status(&self, worker_id: usize) -> Option<WorkerStatus> {
        self.lock().slots.get(&worker_id).map(|s| s.status)
    }

    /// Moves a slot forward. Transitions that would regress are ignored and
    /// reported as `false`.
    pub fn set_status(&self, worker_id: usize, status: WorkerStatus) -> bool {
        let mut state = self.lock();
        let Some(slot) = state.slots.get_mut(&worker_id) else {
            tracing::warn!(worker_id, ?status, "Status update for unknown worker");
            return false;
        };
        if status.rank() <= slot.status.rank() {
            if status != slot.status {
                tracing::debug!(worker_id, from = ?slot.status, to = ?status, "Ignoring status regression");
            }
            return false;
        }
        slot.status = status;
        true
    }

    pub fn start_file(&self, worker_id: usize, path: &Path) {
        let mut state = self.lock();
        let Some(slot) = state.slots.get_mut(&worker_id) else {
            tracing::warn!(worker_id, file = %path.display(), "File start for unknown worker");
            return;
        };
        if slot.status == WorkerStatus::NotStarted {
            slot.status = WorkerStatus::Running;
        }
        slot.in_flight.push(path.to_path_buf());
        state.started_files.push(path.to_path_buf());
    }

    pub fn finish_file(&self, worker_id: usize, path: &Path) {
        let mut state = self.lock();
        if let Some(slot) = state.slots.get_mut(&worker_id) {
            if let Some(pos) = slot.in_flight.iter().position(|p| p == path) {
                slot.in_flight.remove(pos);
            }
        }
        self.finished_files.fetch_add(1, Ordering::SeqCst);
    }

    /// Moves the in-flight files of a worker that went away into the crashed
    /// list and returns them.
    pub fn take_in_flight(&self, worker_id: usize) -> Vec<PathBuf> {
        let mut state = self.lock();
        let files = match state.slots.get_mut(&worker_id) {
            Some(slot) => std::mem::take(&mut slot.in_flight),
            None => Vec::new(),
        };
        state.crashed_files.extend(files.iter().cloned());
        self.crashed_file_count
            .fetch_add(files.len() as u64, Ordering::SeqCst);
        files
    }

    pub fn take_crashed_files(&self) -> Vec<PathBuf> {
        std::mem::take(&mut self.lock().crashed_files)
    }

    pub fn crashed_file_count(&self) -> u64 {
        self.crashed_file_count.load(Ordering::SeqCst)
    }

    /// Files that started since the previous call.
    pub fn take_started_files(&self) -> Vec<PathBuf> {
        std::mem::take(&mut self.lock().started_files)
    }

    pub fn current_files(&self) -> Vec<PathBuf> {
        self.lock()
            .slots
            .values()
            .flat_map(|s| s.in_flight.iter().cloned())
            .collect()
    }

    pub fn finished_file_count(&self) -> u64 {
        self.finished_files.load(Ordering::SeqCst)
    }

    /// Finished plus crashed files.
    pub fn processed_file_count(&self) -> u64 {
        self.finished_file_count() + self.crashed_file_count()
    }

    pub fn set_interrupted(&self, interrupted: bool) {
        self.interrupted.store(interrupted, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn all_terminal(&self) -> bool {
        let state = self.lock();
        !state.slots.is_empty() && state.slots.values().all(|s| s.status.is_terminal())
    }

    pub fn slots_with(&self, status: WorkerStatus) -> usize {
        self.lock().slots.values().filter(|s| s.status == status).count()
    }

    pub fn restart_count(&self, worker_id: usize) -> u32 {
        self.lock().slots.get(&worker_id).map_or(0, |s| s.restarts)
    }

    pub fn note_restart(&self, worker_id: usize) -> u32 {
        let mut state = self.lock();
        match state.slots.get_mut(&worker_id) {
            Some(slot) => {
                slot.restarts += 1;
                slot.restarts
            }
            None => 0,
        }
    }

    pub fn total_restarts(&self) -> u64 {
        self.lock().slots.values().map(|s| s.restarts as u64).sum()
    }
}
