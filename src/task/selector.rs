use super::{Blackboard, Task, TaskNode, TaskState};

/// Runs children in order until one succeeds.
pub struct SelectorTask {
    name: String,
    children: Vec<TaskNode>,
    current: usize,
}

impl SelectorTask {
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
}

impl Task for SelectorTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, blackboard: &Blackboard) -> TaskState {
        while let Some(child) = self.children.get_mut(self.current) {
            match child.tick(blackboard) {
                TaskState::Running => return TaskState::Running,
                TaskState::Success => return TaskState::Success,
                TaskState::Failure => self.current += 1,
            }
        }
        TaskState::Failure
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
