use super::{Blackboard, Task, TaskState};

/// Succeeds iff a boolean blackboard key currently equals `expected`.
pub struct CheckFlagTask {
    key: String,
    expected: bool,
}

impl CheckFlagTask {
    pub fn new(key: impl Into<String>, expected: bool) -> Self {
        Self {
            key: key.into(),
            expected,
        }
    }
}

impl Task for CheckFlagTask {
    fn name(&self) -> &str {
        &self.key
    }

    fn update(&mut self, blackboard: &Blackboard) -> TaskState {
        if blackboard.get::<bool>(&self.key) == self.expected {
            TaskState::Success
        } else {
            TaskState::Failure
        }
    }
}
