//! Tree-shaped cooperative task scheduler.
//!
//! A [`Task`] is driven through `enter` → `update`* → `exit` by the
//! [`TaskNode`] that owns it. Composite tasks own their children as
//! `TaskNode`s; only [`ParallelTask`] moves children onto their own threads.

pub mod blackboard;
pub mod condition;
pub mod lambda;
pub mod parallel;
pub mod repeat;
pub mod runner;
pub mod selector;
pub mod sequence;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

pub use blackboard::Blackboard;
pub use condition::CheckFlagTask;
pub use lambda::LambdaTask;
pub use parallel::ParallelTask;
pub use repeat::{RepeatCondition, RepeatTask};
pub use runner::{drive, TaskRunner};
pub use selector::SelectorTask;
pub use sequence::SequenceTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Success,
    Failure,
}

impl TaskState {
    pub fn is_finished(self) -> bool {
        self != TaskState::Running
    }
}

/// Lifecycle hooks of one scheduler node.
///
/// `update` must return quickly; waiting is expressed by returning
/// [`TaskState::Running`] and letting the driver call again later.
pub trait Task: Send {
    fn name(&self) -> &str {
        "task"
    }

    fn enter(&mut self, _blackboard: &Blackboard) {}

    fn update(&mut self, blackboard: &Blackboard) -> TaskState;

    fn exit(&mut self, _blackboard: &Blackboard) {}

    /// Returns the task to a fresh, re-enterable state.
    fn reset(&mut self, _blackboard: &Blackboard) {}

    /// Requests a prompt end. Must not block.
    fn terminate(&mut self) {}
}

/// Handle for asynchronously terminating a [`TaskNode`] from another thread.
#[derive(Debug, Clone, Default)]
pub struct Terminator {
    flag: Arc<AtomicBool>,
}

impl Terminator {
    pub fn terminate(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_terminated(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fresh,
    Running,
    Finished(TaskState),
}

pub struct TaskNode {
    task: Box<dyn Task>,
    phase: Phase,
    terminator: Terminator,
    terminate_forwarded: bool,
}

impl TaskNode {
    pub fn new(task: impl Task + 'static) -> Self {
        Self::from_box(Box::new(task))
    }

    pub fn from_box(task: Box<dyn Task>) -> Self {
        Self {
            task,
            phase: Phase::Fresh,
            terminator: Terminator::default(),
            terminate_forwarded: false,
        }
    }

    pub fn name(&self) -> &str {
        self.task.name()
    }

    pub fn terminator(&self) -> Terminator {
        self.terminator.clone()
    }

    /// `None` until the node has been entered.
    pub fn state(&self) -> Option<TaskState> {
        match self.phase {
            Phase::Fresh => None,
            Phase::Running => Some(TaskState::Running),
            Phase::Finished(state) => Some(state),
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    /// Advances the node by one step. Finished nodes keep returning their
    /// final state until [`TaskNode::reset`] is called.
    pub fn tick(&mut self, blackboard: &Blackboard) -> TaskState {
        match self.phase {
            Phase::Finished(state) => return state,
            Phase::Fresh => {
                self.task.enter(blackboard);
                self.phase = Phase::Running;
            }
            Phase::Running => {}
        }

        let terminated = self.terminator.is_terminated();
        if terminated && !self.terminate_forwarded {
            tracing::debug!(task = self.task.name(), "Terminating task");
            self.task.terminate();
            self.terminate_forwarded = true;
        }

        let mut state = self.task.update(blackboard);
        if terminated && state == TaskState::Running {
            state = TaskState::Failure;
        }

        if state.is_finished() {
            self.task.exit(blackboard);
            self.phase = Phase::Finished(state);
        }
        state
    }

    /// Ends a node that is still running without another `update`.
    pub fn abort(&mut self, blackboard: &Blackboard) {
        if self.phase == Phase::Running {
            if !self.terminate_forwarded {
                self.task.terminate();
                self.terminate_forwarded = true;
            }
            self.task.exit(blackboard);
            self.phase = Phase::Finished(TaskState::Failure);
        }
    }

    pub fn reset(&mut self, blackboard: &Blackboard) {
        self.abort(blackboard);
        self.task.reset(blackboard);
        self.phase = Phase::Fresh;
        self.terminator.clear();
        self.terminate_forwarded = false;
    }
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("task", &self.task.name())
            .field("phase", &self.phase)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Scripted leaf that records every hook call into a shared log.
    pub struct ScriptedTask {
        pub label: &'static str,
        pub script: Vec<TaskState>,
        pub step: usize,
        pub log: Arc<Mutex<Vec<String>>>,
        pub terminated: bool,
    }

    impl ScriptedTask {
        pub fn new(
            label: &'static str,
            script: Vec<TaskState>,
            log: Arc<Mutex<Vec<String>>>,
        ) -> Self {
            Self {
                label,
                script,
                step: 0,
                log,
                terminated: false,
            }
        }

        fn record(&self, hook: &str) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.label, hook));
        }
    }

    impl Task for ScriptedTask {
        fn name(&self) -> &str {
            self.label
        }

        fn enter(&mut self, _bb: &Blackboard) {
            self.record("enter");
        }

        fn update(&mut self, _bb: &Blackboard) -> TaskState {
            self.record("update");
            if self.terminated {
                return TaskState::Failure;
            }
            let state = self
                .script
                .get(self.step)
                .copied()
                .unwrap_or(TaskState::Running);
            self.step += 1;
            state
        }

        fn exit(&mut self, _bb: &Blackboard) {
            self.record("exit");
        }

        fn reset(&mut self, _bb: &Blackboard) {
            self.step = 0;
            self.terminated = false;
            self.record("reset");
        }

        fn terminate(&mut self) {
            self.terminated = true;
            self.record("terminate");
        }
    }

    pub fn new_log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().clone()
    }
}
