//! The task side of a job.
//!
//! Task definitions live outside of this crate. All the job lifecycle needs from a task is a
//! stable identity and a way to decide whether a given [`Job`] belongs to it, which is captured by
//! the [`Task`] trait.
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::job::Job;

/// The identity of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<TaskId> for String {
    fn from(value: TaskId) -> Self {
        value.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reusable unit of work which jobs are created for.
///
/// Many jobs can reference the same task over time. By default a job belongs to a task when the
/// job's task id is exactly the task's id. Versioned or parameterised task models can widen this by
/// overriding [`Task::includes`].
pub trait Task {
    /// The stable identity of the task.
    fn id(&self) -> &TaskId;

    /// Whether the given job is an execution of this task.
    fn includes(&self, job: &Job) -> bool {
        job.task_id() == self.id()
    }
}

impl Task for TaskId {
    fn id(&self) -> &TaskId {
        self
    }
}
