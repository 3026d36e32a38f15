use std::{
    thread::{self, JoinHandle},
    time::Duration,
};

use super::{drive, Blackboard, Task, TaskNode, TaskState, Terminator};

enum Slot {
    Idle(TaskNode),
    Active {
        terminator: Terminator,
        handle: JoinHandle<(TaskNode, TaskState)>,
    },
    Done(TaskNode, TaskState),
    /// The child was lost to a panic or a failed thread spawn.
    Lost,
}

/// Runs every child on its own OS thread.
///
/// Succeeds once all children succeeded. The first failure terminates the
/// remaining children; the parallel task then reports `Failure` as soon as
/// they have wound down.
pub struct ParallelTask {
    name: String,
    slots: Vec<Slot>,
    poll_interval: Duration,
    failed: bool,
}

impl ParallelTask {
    pub fn new(name: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            name: name.into(),
            slots: Vec::new(),
            poll_interval,
            failed: false,
        }
    }

    pub fn with_child(mut self, child: impl Task + 'static) -> Self {
        self.slots.push(Slot::Idle(TaskNode::new(child)));
        self
    }

    fn terminate_active(&self) {
        for slot in &self.slots {
            if let Slot::Active { terminator, .. } = slot {
                terminator.terminate();
            }
        }
    }

    fn collect_finished(&mut self) {
        for slot in &mut self.slots {
            let finished = matches!(slot, Slot::Active { handle, .. } if handle.is_finished());
            if !finished {
                continue;
            }
            if let Slot::Active { handle, .. } = std::mem::replace(slot, Slot::Lost) {
                match handle.join() {
                    Ok((node, state)) => {
                        if state == TaskState::Failure {
                            self.failed = true;
                        }
                        *slot = Slot::Done(node, state);
                    }
                    Err(_) => {
                        tracing::error!(parallel = %self.name, "Parallel branch panicked");
                        self.failed = true;
                    }
                }
            }
        }
    }
}

impl Task for ParallelTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn enter(&mut self, blackboard: &Blackboard) {
        self.failed = false;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let node = match std::mem::replace(slot, Slot::Lost) {
                Slot::Idle(node) => node,
                other => {
                    *slot = other;
                    continue;
                }
            };
            let terminator = node.terminator();
            let bb = blackboard.clone();
            let poll_interval = self.poll_interval;
            let thread_name = format!("{}-{}", self.name, index);
            let spawned = thread::Builder::new().name(thread_name).spawn(move || {
                let mut node = node;
                let state = drive(&mut node, &bb, poll_interval);
                (node, state)
            });
            match spawned {
                Ok(handle) => *slot = Slot::Active { terminator, handle },
                Err(err) => {
                    tracing::error!(parallel = %self.name, error = %err, "Failed to spawn parallel branch");
                    self.failed = true;
                }
            }
        }
    }

    fn update(&mut self, _blackboard: &Blackboard) -> TaskState {
        self.collect_finished();

        let any_active = self.slots.iter().any(|s| matches!(s, Slot::Active { .. }));
        if self.failed && any_active {
            self.terminate_active();
        }
        if any_active {
            return TaskState::Running;
        }
        if self.failed {
            TaskState::Failure
        } else {
            TaskState::Success
        }
    }

    fn exit(&mut self, _blackboard: &Blackboard) {
        self.terminate_active();
        for slot in &mut self.slots {
            if !matches!(slot, Slot::Active { .. }) {
                continue;
            }
            if let Slot::Active { handle, .. } = std::mem::replace(slot, Slot::Lost) {
                if let Ok((node, state)) = handle.join() {
                    *slot = Slot::Done(node, state);
                }
            }
        }
    }

    fn reset(&mut self, blackboard: &Blackboard) {
        for slot in &mut self.slots {
            match std::mem::replace(slot, Slot::Lost) {
                Slot::Done(mut node, _) | Slot::Idle(mut node) => {
                    node.reset(blackboard);
                    *slot = Slot::Idle(node);
                }
                Slot::Lost => {
                    tracing::warn!(parallel = %self.name, "Parallel branch lost; it will not rerun");
                }
                active @ Slot::Active { .. } => *slot = active,
            }
        }
        self.failed = false;
    }

    fn terminate(&mut self) {
        self.terminate_active();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::testing::*;
    use crate::task::LambdaTask;
    use std::time::Instant;
    use TaskState::*;

    fn run(node: &mut TaskNode, bb: &Blackboard) -> TaskState {
        drive(node, bb, Duration::from_millis(1))
    }

    #[test]
    fn children_share_the_blackboard_and_all_succeed() {
        let bb = Blackboard::new();
        let mut parallel = ParallelTask::new("par", Duration::from_millis(1));
        for _ in 0..4 {
            let bb = bb.clone();
            parallel = parallel.with_child(LambdaTask::new("inc", move || {
                bb.update::<i64, _>("done", |v| v + 1);
            }));
        }
        let mut node = TaskNode::new(parallel);
        assert_eq!(run(&mut node, &bb), Success);
        assert_eq!(bb.get::<i64>("done"), 4);
    }

    #[test]
    fn failure_terminates_siblings() {
        let log = new_log();
        let bb = Blackboard::new();
        let mut node = TaskNode::new(
            ParallelTask::new("par", Duration::from_millis(1))
                .with_child(ScriptedTask::new("forever", vec![], log.clone()))
                .with_child(ScriptedTask::new("fails", vec![Running, Failure], log.clone())),
        );

        let started = Instant::now();
        assert_eq!(run(&mut node, &bb), Failure);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(entries(&log).contains(&"forever:terminate".to_string()));
    }

    #[test]
    fn can_rerun_after_reset() {
        let bb = Blackboard::new();
        let counter = bb.clone();
        let mut node = TaskNode::new(
            ParallelTask::new("par", Duration::from_millis(1)).with_child(LambdaTask::new(
                "inc",
                move || {
                    counter.update::<i64, _>("runs", |v| v + 1);
                },
            )),
        );
        assert_eq!(run(&mut node, &bb), Success);
        node.reset(&bb);
        assert_eq!(run(&mut node, &bb), Success);
        assert_eq!(bb.get::<i64>("runs"), 2);
    }

    #[test]
    fn repeated_parallel_runs_children_each_iteration() {
        let bb = Blackboard::new();
        let mut parallel = ParallelTask::new("par", Duration::from_millis(1));
        for _ in 0..2 {
            let counter = bb.clone();
            parallel = parallel.with_child(LambdaTask::new("inc", move || {
                counter.update::<i64, _>("runs", |v| v + 1);
            }));
        }
        let mut node = TaskNode::new(parallel);
        for _ in 0..3 {
            assert_eq!(run(&mut node, &bb), Success);
            node.reset(&bb);
        }
        assert_eq!(bb.get::<i64>("runs"), 6);
    }
}
