use std::{thread, time::Duration};

use super::{Blackboard, TaskNode, TaskState, Terminator};

/// Ticks `node` until it leaves `Running`, sleeping `poll_interval` between
/// ticks. Used by the top-level driver and by every parallel branch.
pub fn drive(node: &mut TaskNode, blackboard: &Blackboard, poll_interval: Duration) -> TaskState {
    loop {
        let state = node.tick(blackboard);
        if state.is_finished() {
            return state;
        }
        thread::sleep(poll_interval);
    }
}

/// Single-threaded scheduling loop for the root of a task tree.
pub struct TaskRunner {
    root: TaskNode,
    blackboard: Blackboard,
    poll_interval: Duration,
}

impl TaskRunner {
    pub fn new(root: TaskNode, blackboard: Blackboard, poll_interval: Duration) -> Self {
        Self {
            root,
            blackboard,
            poll_interval,
        }
    }

    pub fn blackboard(&self) -> &Blackboard {
        &self.blackboard
    }

    pub fn terminator(&self) -> Terminator {
        self.root.terminator()
    }

    pub fn tick(&mut self) -> TaskState {
        self.root.tick(&self.blackboard)
    }

    pub fn run_to_completion(&mut self) -> TaskState {
        let state = drive(&mut self.root, &self.blackboard, self.poll_interval);
        tracing::debug!(root = self.root.name(), ?state, "Task tree finished");
        state
    }

    /// Resets the tree and clears the blackboard so the runner can be reused.
    pub fn reset(&mut self) {
        self.root.reset(&self.blackboard);
        self.blackboard.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::testing::*;
    use crate::task::SequenceTask;
    use TaskState::*;

    #[test]
    fn runs_tree_to_completion() {
        let log = new_log();
        let root = TaskNode::new(
            SequenceTask::new("root")
                .with_child(ScriptedTask::new("a", vec![Running, Running, Success], log.clone()))
                .with_child(ScriptedTask::new("b", vec![Success], log.clone())),
        );
        let mut runner = TaskRunner::new(root, Blackboard::new(), Duration::from_millis(1));
        assert_eq!(runner.run_to_completion(), Success);
        assert!(entries(&log).contains(&"b:exit".to_string()));
    }

    #[test]
    fn reset_clears_blackboard() {
        let log = new_log();
        let root = TaskNode::new(ScriptedTask::new("a", vec![Success], log));
        let mut runner = TaskRunner::new(root, Blackboard::new(), Duration::from_millis(1));
        runner.blackboard().set("k", 1_i64);
        runner.run_to_completion();
        runner.reset();
        assert!(!runner.blackboard().contains("k"));
    }
}
