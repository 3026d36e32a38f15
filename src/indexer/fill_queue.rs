use std::collections::VecDeque;
use std::sync::Arc;

use super::command::IndexerCommand;
use super::keys;
use crate::ipc::Coordinator;
use crate::task::{Blackboard, Task, TaskState};

/// Feeds the bounded command queue from the full backlog in small batches
/// and marks the queue stopped once the backlog is exhausted.
pub struct FillQueueTask {
    coordinator: Arc<Coordinator>,
    backlog: VecDeque<IndexerCommand>,
    batch_size: usize,
}

impl FillQueueTask {
    pub fn new(
        coordinator: Arc<Coordinator>,
        commands: impl IntoIterator<Item = IndexerCommand>,
        batch_size: usize,
    ) -> Self {
        Self {
            coordinator,
            backlog: commands.into_iter().collect(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn remaining(&self) -> usize {
        self.backlog.len()
    }
}

impl Task for FillQueueTask {
    fn name(&self) -> &str {
        "fill_queue"
    }

    fn update(&mut self, blackboard: &Blackboard) -> TaskState {
        let queue = self.coordinator.queue();
        if self.coordinator.status().is_interrupted()
            || blackboard.get::<bool>(keys::INTERRUPT_REQUESTED)
        {
            let dropped = self.backlog.len() + queue.clear();
            self.backlog.clear();
            tracing::info!(dropped, "Command backlog dropped after interruption");
            return TaskState::Success;
        }

        let room = queue.free_slots().min(self.batch_size);
        for _ in 0..room {
            let Some(command) = self.backlog.pop_front() else {
                break;
            };
            if let Err(command) = queue.push(command) {
                self.backlog.push_front(command);
                break;
            }
        }

        if self.backlog.is_empty() {
            queue.set_stopped();
            tracing::debug!(dispatched = queue.dispatched(), "Command backlog exhausted");
            return TaskState::Success;
        }
        TaskState::Running
    }

    fn terminate(&mut self) {
        self.coordinator.queue().clear();
        self.backlog.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::Pop;
    use crate::task::TaskNode;

    fn commands(n: usize) -> Vec<IndexerCommand> {
        (0..n)
            .map(|i| IndexerCommand::new(format!("f{i}.rs"), "/"))
            .collect()
    }

    #[test]
    fn fills_in_batches_bounded_by_capacity() {
        let coordinator = Coordinator::new("run", 3);
        let bb = Blackboard::new();
        let mut node = TaskNode::new(FillQueueTask::new(coordinator.clone(), commands(5), 2));

        assert_eq!(node.tick(&bb), TaskState::Running);
        assert_eq!(coordinator.queue().len(), 2);
        assert_eq!(node.tick(&bb), TaskState::Running);
        assert_eq!(coordinator.queue().len(), 3);
        assert!(!coordinator.queue().is_stopped());

        for _ in 0..3 {
            assert!(matches!(coordinator.queue().pop(), Pop::Command(_)));
        }
        assert_eq!(node.tick(&bb), TaskState::Success);
        assert!(coordinator.queue().is_stopped());
        assert_eq!(coordinator.queue().len(), 2);
    }

    #[test]
    fn interruption_drops_backlog() {
        let coordinator = Coordinator::new("run", 2);
        let bb = Blackboard::new();
        let mut node = TaskNode::new(FillQueueTask::new(coordinator.clone(), commands(5), 2));
        node.tick(&bb);
        bb.set(keys::INTERRUPT_REQUESTED, true);
        assert_eq!(node.tick(&bb), TaskState::Success);
        assert!(coordinator.queue().is_empty());
        assert!(coordinator.queue().is_drained());
    }

    #[test]
    fn empty_backlog_stops_immediately() {
        let coordinator = Coordinator::new("run", 2);
        let bb = Blackboard::new();
        let mut node = TaskNode::new(FillQueueTask::new(coordinator.clone(), Vec::new(), 2));
        assert_eq!(node.tick(&bb), TaskState::Success);
        assert_eq!(coordinator.queue().pop(), Pop::Drained);
    }
}
