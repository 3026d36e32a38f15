use super::{Blackboard, Task, TaskNode, TaskState};

/// Runs children in order; the first failure ends the sequence.
pub struct SequenceTask {
    name: String,
    children: Vec<TaskNode>,
    current: usize,
}

impl SequenceTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            current: 0,
        }
    }

    pub fn with_child(mut self, child: impl Task + 'static) -> Self {
        self.children.push(TaskNode::new(child));
        self
    }

    pub fn push(&mut self, child: TaskNode) {
        self.children.push(child);
    }
}

impl Task for SequenceTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, blackboard: &Blackboard) -> TaskState {
        while let Some(child) = self.children.get_mut(self.current) {
            match child.tick(blackboard) {
                TaskState::Running => return TaskState::Running,
                TaskState::Failure => {
                    tracing::debug!(sequence = %self.name, child = child.name(), "Sequence child failed");
                    return TaskState::Failure;
                }
                TaskState::Success => self.current += 1,
            }
        }
        TaskState::Success
    }

    fn exit(&mut self, blackboard: &Blackboard) {
        for child in &mut self.children {
            child.abort(blackboard);
        }
    }

    fn reset(&mut self, blackboard: &Blackboard) {
        for child in &mut self.children {
            child.reset(blackboard);
        }
        self.current = 0;
    }

    fn terminate(&mut self) {
        if let Some(child) = self.children.get(self.current) {
            child.terminator().terminate();
        }
    }
}
