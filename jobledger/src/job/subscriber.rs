//! Status change notification.
//!
//! A [`Job`] owns an ordered list of [`Subscriber`]s which are invoked synchronously, in
//! registration order, every time the job's status changes.
//!
//! Two kinds of subscriber are supported out of the box:
//!
//! - closures `Fn(&Job, &StatusChange)`, which run inline with the status change, and
//! - [`mpsc::UnboundedSender<StatusChange>`], which forwards the change to a channel and returns
//!   immediately. Delivery to the receiver is therefore asynchronous with respect to the status
//!   change, which is useful when a slow consumer must not hold up the execution engine.
//!
//! # Example
//!
//! ```
//! use jobledger::prelude::*;
//! use tokio::sync::mpsc;
//!
//! let (sender, mut receiver) = mpsc::unbounded_channel::<StatusChange>();
//! let mut job = Job::new(JobId::generate(), TaskId::from("ingest"));
//! job.on_status_change(Subscriber::from_fn(|job: &Job, change: &StatusChange| {
//!     println!("{} moved from {} to {}", job.id(), change.previous, change.current);
//! }));
//! job.on_status_change(sender.into());
//!
//! job.mark_running().unwrap();
//!
//! let change = receiver.try_recv().unwrap();
//! assert_eq!(change.current, JobStatus::Running);
//! ```
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

use super::{Job, JobId, JobStatus};
use crate::task::TaskId;

/// A single status transition of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub previous: JobStatus,
    pub current: JobStatus,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("Status change receiver has been dropped")]
    Disconnected,
    #[error("Status change rejected: {0}")]
    Rejected(String),
}

/// Something interested in the status changes of a job.
pub trait StatusSubscriber: Send + Sync {
    /// Called after the status of `job` has changed.
    ///
    /// Returning an error does not undo the status change; the error is logged and the remaining
    /// subscribers are still notified.
    fn status_changed(&self, job: &Job, change: &StatusChange) -> Result<(), SubscriberError>;
}

impl<F> StatusSubscriber for F
where
    F: Fn(&Job, &StatusChange) + Send + Sync,
{
    fn status_changed(&self, job: &Job, change: &StatusChange) -> Result<(), SubscriberError> {
        self(job, change);
        Ok(())
    }
}

impl StatusSubscriber for mpsc::UnboundedSender<StatusChange> {
    fn status_changed(&self, _job: &Job, change: &StatusChange) -> Result<(), SubscriberError> {
        self.send(change.clone())
            .map_err(|_| SubscriberError::Disconnected)
    }
}

/// A shareable handle to a [`StatusSubscriber`].
#[derive(Clone)]
pub struct Subscriber(Arc<dyn StatusSubscriber>);

impl Subscriber {
    pub fn new(subscriber: impl StatusSubscriber + 'static) -> Self {
        Self(Arc::new(subscriber))
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Job, &StatusChange) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl From<mpsc::UnboundedSender<StatusChange>> for Subscriber {
    fn from(sender: mpsc::UnboundedSender<StatusChange>) -> Self {
        Self::new(sender)
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Subscriber(..)")
    }
}

#[derive(Clone, Default)]
pub(crate) struct Subscribers(Vec<Subscriber>);

impl Subscribers {
    pub(crate) fn push(&mut self, subscriber: Subscriber) {
        self.0.push(subscriber);
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn notify(&self, job: &Job, change: &StatusChange) {
        self.0.iter().for_each(|subscriber| {
            if let Err(err) = subscriber.0.status_changed(job, change) {
                let job_id = &change.job_id;
                tracing::error!(
                    %job_id,
                    ?err,
                    "Status change subscriber failed for job {job_id}: {err}"
                );
            }
        });
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.0.len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;

    struct Rejecting;

    impl StatusSubscriber for Rejecting {
        fn status_changed(
            &self,
            _job: &Job,
            _change: &StatusChange,
        ) -> Result<(), SubscriberError> {
            Err(SubscriberError::Rejected("not interested".to_owned()))
        }
    }

    #[test]
    fn channel_subscriber_forwards_changes() {
        let (sender, mut receiver) = mpsc::unbounded_channel::<StatusChange>();
        let mut job = Job::raw_job();
        job.on_status_change(sender.into());

        job.mark_pending().unwrap();
        job.mark_running().unwrap();
        job.mark_completed().unwrap();

        let statuses: Vec<_> = std::iter::from_fn(|| receiver.try_recv().ok())
            .map(|change| {
                assert_eq!(&change.job_id, job.id());
                assert_eq!(&change.task_id, job.task_id());
                change.current
            })
            .collect();
        assert_eq!(
            statuses,
            [JobStatus::Pending, JobStatus::Running, JobStatus::Completed]
        );
    }

    #[test]
    fn failing_subscriber_does_not_abort_status_change() {
        let (sender, receiver) = mpsc::unbounded_channel::<StatusChange>();
        drop(receiver);
        let called = Arc::new(Mutex::new(0));
        let mut job = Job::raw_job();
        job.on_status_change(Subscriber::new(Rejecting));
        job.on_status_change(sender.into());
        job.on_status_change(Subscriber::from_fn({
            let called = called.clone();
            move |_: &Job, _: &StatusChange| *called.lock().unwrap() += 1
        }));

        assert!(job.mark_running().is_ok());

        assert!(job.is_running());
        assert_eq!(*called.lock().unwrap(), 1);
    }

    #[test]
    fn cloned_jobs_share_subscribers() {
        let called = Arc::new(Mutex::new(0));
        let mut job = Job::raw_job();
        job.on_status_change(Subscriber::from_fn({
            let called = called.clone();
            move |_: &Job, _: &StatusChange| *called.lock().unwrap() += 1
        }));
        let mut clone = job.clone();

        job.mark_running().unwrap();
        clone.mark_canceled().unwrap();

        assert_eq!(*called.lock().unwrap(), 2);
    }
}
