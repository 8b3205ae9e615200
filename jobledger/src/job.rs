use std::{
    fmt::Display,
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::task::{Task, TaskId};

pub mod subscriber;

use subscriber::{StatusChange, Subscriber, Subscribers};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// The identity of a job.
///
/// Generated ids take the form `JOB_<uuid>` where the uuid is a random (v4) uuid in its canonical
/// hyphenated form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    const PREFIX: &'static str = "JOB_";

    /// Generates a fresh, globally unique, job id.
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<JobId> for String {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The lifecycle states of a job.
///
/// The execution engine drives the transitions:
///
/// `Submitted -> (Blocked ->) Pending -> Running -> Completed | Failed | Canceled`
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Submitted,
    Blocked,
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl JobStatus {
    /// Whether this is a terminal status, i.e. one from which no further transition occurs.
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Submitted => "SUBMITTED",
            Self::Blocked => "BLOCKED",
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        };
        f.write_str(status)
    }
}

/// The position of a job in creation order.
///
/// Jobs created within the same clock tick are ordered by a process wide monotonic counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CreationOrder {
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusError {
    #[error("Job {job_id} is already {status} and can no longer change status")]
    AlreadyFinished { job_id: JobId, status: JobStatus },
}

/// A single execution attempt of a task.
///
/// Only the id, task id, status, creation order and stacktrace are persisted. Subscribers belong
/// to the in memory value: a job loaded from a repository starts without any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    task_id: TaskId,
    status: JobStatus,
    created_at: DateTime<Utc>,
    sequence: u64,
    #[serde(default)]
    stacktrace: Vec<String>,
    #[serde(skip)]
    subscribers: Subscribers,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.task_id == other.task_id
            && self.status == other.status
            && self.created_at == other.created_at
            && self.sequence == other.sequence
            && self.stacktrace == other.stacktrace
    }
}

impl Eq for Job {}

impl Job {
    /// Creates a newly submitted job for the given task.
    pub fn new(id: JobId, task_id: TaskId) -> Self {
        Self {
            id,
            task_id,
            status: JobStatus::Submitted,
            created_at: Utc::now(),
            sequence: SEQUENCE.fetch_add(1, Ordering::SeqCst),
            stacktrace: vec![],
            subscribers: Default::default(),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Details recorded each time the job was marked as failed.
    pub fn stacktrace(&self) -> &[String] {
        &self.stacktrace
    }

    pub fn creation_order(&self) -> CreationOrder {
        CreationOrder {
            created_at: self.created_at,
            sequence: self.sequence,
        }
    }

    /// Whether this job is an execution of the given task.
    pub fn belongs_to<T: Task + ?Sized>(&self, task: &T) -> bool {
        task.includes(self)
    }

    /// Registers a subscriber to be notified on every status change.
    ///
    /// Subscribers are notified in the order in which they were registered.
    pub fn on_status_change(&mut self, subscriber: Subscriber) {
        self.subscribers.push(subscriber);
    }

    /// The number of subscribers registered on this value of the job.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Sets the status of the job, notifying every subscriber of the change.
    ///
    /// Setting the current status again is a no-op and notifies nobody. Once the job has reached a
    /// terminal status it can no longer be changed and [`StatusError::AlreadyFinished`] is
    /// returned.
    ///
    /// Subscribers run synchronously on the calling thread. A subscriber returning an error is
    /// logged and skipped, the new status is kept and the remaining subscribers are still
    /// notified.
    pub fn set_status(&mut self, status: JobStatus) -> Result<(), StatusError> {
        self.transition(status, |_| {})
    }

    pub fn mark_blocked(&mut self) -> Result<(), StatusError> {
        self.set_status(JobStatus::Blocked)
    }

    pub fn mark_pending(&mut self) -> Result<(), StatusError> {
        self.set_status(JobStatus::Pending)
    }

    pub fn mark_running(&mut self) -> Result<(), StatusError> {
        self.set_status(JobStatus::Running)
    }

    pub fn mark_completed(&mut self) -> Result<(), StatusError> {
        self.set_status(JobStatus::Completed)
    }

    /// Marks the job as failed, recording the details in the job's stacktrace.
    ///
    /// The details are recorded before subscribers are notified.
    pub fn mark_failed(&mut self, details: impl ToString) -> Result<(), StatusError> {
        self.transition(JobStatus::Failed, |job| {
            job.stacktrace.push(details.to_string())
        })
    }

    pub fn mark_canceled(&mut self) -> Result<(), StatusError> {
        self.set_status(JobStatus::Canceled)
    }

    pub fn is_submitted(&self) -> bool {
        self.status == JobStatus::Submitted
    }

    pub fn is_blocked(&self) -> bool {
        self.status == JobStatus::Blocked
    }

    pub fn is_pending(&self) -> bool {
        self.status == JobStatus::Pending
    }

    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }

    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }

    pub fn is_canceled(&self) -> bool {
        self.status == JobStatus::Canceled
    }

    /// Whether the job has reached a terminal status: completed, failed or canceled.
    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    fn transition(
        &mut self,
        status: JobStatus,
        update: impl FnOnce(&mut Self),
    ) -> Result<(), StatusError> {
        if self.status == status {
            return Ok(());
        }
        if self.is_finished() {
            let job_id = &self.id;
            tracing::warn!(
                %job_id,
                current = %self.status,
                requested = %status,
                "Refusing status change of finished job {job_id}"
            );
            return Err(StatusError::AlreadyFinished {
                job_id: self.id.clone(),
                status: self.status,
            });
        }

        let change = StatusChange {
            job_id: self.id.clone(),
            task_id: self.task_id.clone(),
            previous: self.status,
            current: status,
            changed_at: Utc::now(),
        };
        update(self);
        self.status = status;
        tracing::debug!(
            job_id = %change.job_id,
            previous = %change.previous,
            current = %change.current,
            "Job status changed"
        );
        self.subscribers.notify(self, &change);
        Ok(())
    }
}
