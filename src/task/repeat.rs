use super::{Blackboard, Task, TaskNode, TaskState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepeatCondition {
    WhileSuccess,
    WhileFailure,
    /// Repeat while the boolean blackboard key equals `value`.
    WhileFlag { key: String, value: bool },
}

/// Re-enters its child while `condition` holds, at most `max_repeats` times.
///
/// Every repetition returns [`TaskState::Running`] once, so the driver's
/// polling delay applies between iterations.
pub struct RepeatTask {
    name: String,
    child: TaskNode,
    condition: RepeatCondition,
    exit_state: TaskState,
    max_repeats: Option<usize>,
    repeats: usize,
}

impl RepeatTask {
    pub fn new(
        name: impl Into<String>,
        condition: RepeatCondition,
        exit_state: TaskState,
        child: impl Task + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            child: TaskNode::new(child),
            condition,
            exit_state,
            max_repeats: None,
            repeats: 0,
        }
    }

    pub fn with_max_repeats(mut self, max: usize) -> Self {
        self.max_repeats = Some(max);
        self
    }

    fn should_repeat(&self, state: TaskState, blackboard: &Blackboard) -> bool {
        let holds = match &self.condition {
            RepeatCondition::WhileSuccess => state == TaskState::Success,
            RepeatCondition::WhileFailure => state == TaskState::Failure,
            RepeatCondition::WhileFlag { key, value } => blackboard.get::<bool>(key) == *value,
        };
        holds && self.max_repeats.map_or(true, |max| self.repeats < max)
    }
}

impl Task for RepeatTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, blackboard: &Blackboard) -> TaskState {
        let state = self.child.tick(blackboard);
        if state == TaskState::Running {
            return TaskState::Running;
        }

        self.repeats += 1;
        if self.should_repeat(state, blackboard) {
            self.child.reset(blackboard);
            return TaskState::Running;
        }
        self.exit_state
    }

    fn exit(&mut self, blackboard: &Blackboard) {
        self.child.abort(blackboard);
    }

    fn reset(&mut self, blackboard: &Blackboard) {
        self.child.reset(blackboard);
        self.repeats = 0;
    }

    fn terminate(&mut self) {
        self.child.terminator().terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::testing::*;
    use TaskState::*;

    #[test]
    fn repeats_while_child_succeeds() {
        let bb = Blackboard::new();
        let counter = bb.clone();
        let mut node = TaskNode::new(RepeatTask::new(
            "repeat",
            RepeatCondition::WhileSuccess,
            Success,
            crate::task::LambdaTask::new("inc", move || {
                counter.update::<i64, _>("n", |n| n + 1);
            }),
        ).with_max_repeats(4));

        let mut ticks = 0;
        while node.tick(&bb) == Running {
            ticks += 1;
        }
        assert_eq!(ticks, 3);
        assert_eq!(bb.get::<i64>("n"), 4);
        assert_eq!(node.state(), Some(Success));
    }

    #[test]
    fn stops_when_flag_changes() {
        let log = new_log();
        let bb = Blackboard::new();
        bb.set("waiting", true);
        let mut node = TaskNode::new(RepeatTask::new(
            "wait",
            RepeatCondition::WhileFlag {
                key: "waiting".into(),
                value: true,
            },
            Failure,
            ScriptedTask::new("poll", vec![Success], log.clone()),
        ));

        assert_eq!(node.tick(&bb), Running);
        assert_eq!(node.tick(&bb), Running);
        bb.set("waiting", false);
        assert_eq!(node.tick(&bb), Failure);
        let enters = entries(&log)
            .iter()
            .filter(|e| e.as_str() == "poll:enter")
            .count();
        assert_eq!(enters, 3);
    }

    #[test]
    fn exits_with_configured_state_when_condition_breaks() {
        let log = new_log();
        let bb = Blackboard::new();
        let mut node = TaskNode::new(RepeatTask::new(
            "repeat",
            RepeatCondition::WhileSuccess,
            Success,
            ScriptedTask::new("a", vec![Failure], log),
        ));
        assert_eq!(node.tick(&bb), Success);
    }
}
