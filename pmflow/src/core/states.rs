//! Task and stage lifecycle state machines.
//!
//! Tasks inside a stage run strictly in declaration order. A stage succeeds
//! only when every task succeeded; the first failure fails the stage and
//! leaves the remaining tasks pending.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("stage is {0:?}, expected {1:?}")]
    Stage(StageState, StageState),
    #[error("task {index} is {actual:?}, expected {expected:?}")]
    Task {
        index: usize,
        actual: TaskState,
        expected: TaskState,
    },
    #[error("task {index} cannot start before task {blocking} succeeded")]
    OutOfOrder { index: usize, blocking: usize },
    #[error("task index {0} out of range")]
    UnknownTask(usize),
}

/// Lifecycle of one stage and its tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    state: StageState,
    tasks: Vec<TaskState>,
}

impl StageProgress {
    pub fn new(task_count: usize) -> Self {
        Self {
            state: StageState::Pending,
            tasks: vec![TaskState::Pending; task_count],
        }
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn tasks(&self) -> &[TaskState] {
        &self.tasks
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.expect_stage(StageState::Pending)?;
        self.state = StageState::Running;
        if self.tasks.is_empty() {
            self.state = StageState::Succeeded;
        }
        Ok(())
    }

    pub fn begin_task(&mut self, index: usize) -> Result<(), TransitionError> {
        self.expect_stage(StageState::Running)?;
        self.expect_task(index, TaskState::Pending)?;
        if let Some(blocking) = self.tasks[..index]
            .iter()
            .position(|state| *state != TaskState::Succeeded)
        {
            return Err(TransitionError::OutOfOrder { index, blocking });
        }
        self.tasks[index] = TaskState::Running;
        Ok(())
    }

    pub fn complete_task(&mut self, index: usize) -> Result<(), TransitionError> {
        self.expect_stage(StageState::Running)?;
        self.expect_task(index, TaskState::Running)?;
        self.tasks[index] = TaskState::Succeeded;
        if self.tasks.iter().all(|state| *state == TaskState::Succeeded) {
            self.state = StageState::Succeeded;
        }
        Ok(())
    }

    pub fn fail_task(&mut self, index: usize) -> Result<(), TransitionError> {
        self.expect_stage(StageState::Running)?;
        self.expect_task(index, TaskState::Running)?;
        self.tasks[index] = TaskState::Failed;
        self.state = StageState::Failed;
        Ok(())
    }

    fn expect_stage(&self, expected: StageState) -> Result<(), TransitionError> {
        if self.state != expected {
            return Err(TransitionError::Stage(self.state, expected));
        }
        Ok(())
    }

    fn expect_task(&self, index: usize, expected: TaskState) -> Result<(), TransitionError> {
        let actual = *self
            .tasks
            .get(index)
            .ok_or(TransitionError::UnknownTask(index))?;
        if actual != expected {
            return Err(TransitionError::Task {
                index,
                actual,
                expected,
            });
        }
        Ok(())
    }
}
