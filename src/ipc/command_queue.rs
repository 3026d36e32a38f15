use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::indexer::command::IndexerCommand;

/// Result of a worker asking for work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pop {
    Command(IndexerCommand),
    /// Nothing available right now; ask again after the polling delay.
    Wait,
    /// The backlog is exhausted and no further commands will arrive.
    Drained,
}

#[derive(Default)]
struct QueueState {
    commands: VecDeque<IndexerCommand>,
    stopped: bool,
    paused: bool,
    dispatched: u64,
}

/// Bounded command queue filled by the orchestrator and drained by workers.
pub struct CommandQueue {
    state: Mutex<QueueState>,
    capacity: usize,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.lock().commands.len())
    }

    /// Hands the command back when the queue is full.
    pub fn push(&self, command: IndexerCommand) -> Result<(), IndexerCommand> {
        let mut state = self.lock();
        if state.commands.len() >= self.capacity {
            return Err(command);
        }
        state.commands.push_back(command);
        Ok(())
    }

    pub fn pop(&self) -> Pop {
        let mut state = self.lock();
        if !state.paused {
            if let Some(command) = state.commands.pop_front() {
                state.dispatched += 1;
                return Pop::Command(command);
            }
        }
        if state.stopped && state.commands.is_empty() {
            Pop::Drained
        } else {
            Pop::Wait
        }
    }

    /// Raised once the backlog has been fully pushed.
    pub fn set_stopped(&self) {
        self.lock().stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// While paused, workers are told to wait even if commands are queued.
    pub fn set_paused(&self, paused: bool) {
        self.lock().paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn is_drained(&self) -> bool {
        let state = self.lock();
        state.stopped && state.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().commands.is_empty()
    }

    pub fn dispatched(&self) -> u64 {
        self.lock().dispatched
    }

    /// Drops all queued commands and stops the queue. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.commands.len();
        state.commands.clear();
        state.stopped = true;
        dropped
    }
}
