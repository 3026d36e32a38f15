use super::{Blackboard, Task, TaskState};

/// One-shot side effect between pipeline stages.
pub struct LambdaTask {
    name: String,
    action: Box<dyn FnMut() + Send>,
}

impl LambdaTask {
    pub fn new(name: impl Into<String>, action: impl FnMut() + Send + 'static) -> Self {
        Self {
            name: name.into(),
            action: Box::new(action),
        }
    }
}

impl Task for LambdaTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, _blackboard: &Blackboard) -> TaskState {
        (self.action)();
        TaskState::Success
    }
}
