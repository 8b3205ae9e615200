//! Bookkeeping for the lifecycle of jobs.
//!
//! A job is a single execution attempt of a task. This crate does not execute anything itself:
//! it creates job records, persists them through a [`JobRepository`], lets interested parties
//! subscribe to status changes, and refuses to delete jobs which are still in flight.
//!
//! # Example
//!
//! ```
//! use jobledger::prelude::*;
//! use jobledger::repository::memory::InMemoryJobRepository;
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//!
//! let manager = JobManager::new(InMemoryJobRepository::new());
//! let task = TaskId::from("ingest");
//! let on_change = Subscriber::from_fn(|job: &Job, change: &StatusChange| {
//!     println!("{} is now {}", job.id(), change.current);
//! });
//!
//! let mut job = manager.create(&task, [on_change]).await.unwrap();
//!
//! // Normally done by the execution engine.
//! job.mark_running().unwrap();
//! manager.set(&job).await.unwrap();
//! assert!(manager.delete(&job, false).await.is_err());
//!
//! job.mark_completed().unwrap();
//! manager.set(&job).await.unwrap();
//!
//! assert_eq!(manager.get_latest_job(&task).await.unwrap(), job);
//! manager.delete(&job, false).await.unwrap();
//! # });
//! ```
pub mod job;
pub mod prelude;
pub mod repository;
pub mod task;

use job::{subscriber::Subscriber, Job, JobId};
use repository::{JobRepository, RepositoryError};
use task::{Task, TaskId};
use thiserror::Error;
use tracing::instrument;

type Result<T> = std::result::Result<T, JobManagerError>;

/// The entry point for creating, storing, retrieving and deleting jobs.
///
/// The manager holds nothing but its repository handle, so it can be shared freely between any
/// number of concurrent callers. All coordination of concurrent access is left to the repository.
/// In particular a `get`, modify, `set` cycle is not atomic: two callers doing this for the same
/// job race and the last write wins.
#[derive(Debug, Clone)]
pub struct JobManager<R> {
    repository: R,
}

impl<R> JobManager<R>
where
    R: JobRepository,
{
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Creates and persists a new job representing a unique execution of `task`.
    ///
    /// Each of the `callbacks` is registered on the returned job, in order, and will be invoked
    /// whenever the job's status changes.
    #[instrument(skip_all, fields(task_id = %task.id()))]
    pub async fn create<T>(
        &self,
        task: &T,
        callbacks: impl IntoIterator<Item = Subscriber>,
    ) -> Result<Job>
    where
        T: Task + ?Sized,
    {
        let mut job = Job::new(JobId::generate(), task.id().clone());
        self.set(&job).await?;
        callbacks
            .into_iter()
            .for_each(|callback| job.on_status_change(callback));
        tracing::debug!(job_id = %job.id(), "Created job {}", job.id());
        Ok(job)
    }

    /// Saves or updates a job.
    pub async fn set(&self, job: &Job) -> Result<()> {
        self.repository.save(job).await?;
        Ok(())
    }

    /// Gets the job with the given id.
    ///
    /// Returns [`JobManagerError::NonExistingJob`] when there is no such job.
    #[instrument(skip(self))]
    pub async fn get(&self, job_id: &JobId) -> Result<Job> {
        match self.repository.load(job_id).await {
            Ok(job) => Ok(job),
            Err(RepositoryError::JobNotFound(_)) => {
                tracing::error!(%job_id, "Job: {job_id} does not exist");
                Err(JobManagerError::NonExistingJob(job_id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Gets all the existing jobs, in no particular order.
    pub async fn get_all(&self) -> Result<Vec<Job>> {
        Ok(self.repository.load_all().await?)
    }

    /// Deletes the job if it is finished, or regardless of its status when `force` is set.
    ///
    /// Returns [`JobManagerError::JobNotDeleted`] without touching the repository when the job is
    /// still in flight and `force` is not set.
    #[instrument(skip(self, job), fields(job_id = %job.id()))]
    pub async fn delete(&self, job: &Job, force: bool) -> Result<()> {
        if job.is_finished() || force {
            self.repository.delete(job.id()).await?;
            tracing::debug!(job_id = %job.id(), force, "Deleted job {}", job.id());
            Ok(())
        } else {
            let err = JobManagerError::JobNotDeleted(job.id().clone());
            tracing::warn!(job_id = %job.id(), status = %job.status(), "{err}");
            Err(err)
        }
    }

    /// Deletes every job, whatever its status.
    pub async fn delete_all(&self) -> Result<()> {
        self.repository.delete_all().await?;
        tracing::debug!("Deleted all jobs");
        Ok(())
    }

    /// Gets every job of `task`, oldest first.
    pub async fn get_jobs_for_task<T>(&self, task: &T) -> Result<Vec<Job>>
    where
        T: Task + ?Sized,
    {
        let mut jobs: Vec<_> = self
            .get_all()
            .await?
            .into_iter()
            .filter(|job| job.belongs_to(task))
            .collect();
        jobs.sort_by_key(Job::creation_order);
        Ok(jobs)
    }

    /// Gets the most recently created job of `task`.
    ///
    /// Returns [`JobManagerError::NoJobForTask`] when the task has no jobs.
    #[instrument(skip_all, fields(task_id = %task.id()))]
    pub async fn get_latest_job<T>(&self, task: &T) -> Result<Job>
    where
        T: Task + ?Sized,
    {
        self.get_all()
            .await?
            .into_iter()
            .filter(|job| job.belongs_to(task))
            .max_by_key(Job::creation_order)
            .ok_or_else(|| {
                let task_id = task.id();
                tracing::error!(%task_id, "No job exists for task {task_id}");
                JobManagerError::NoJobForTask(task_id.clone())
            })
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JobManagerError {
    #[error("Job {0} does not exist")]
    NonExistingJob(JobId),
    #[error("Job {0} is not finished and cannot be deleted")]
    JobNotDeleted(JobId),
    #[error("No job exists for task {0}")]
    NoJobForTask(TaskId),
    #[error("Error communicating with the repository")]
    RepositoryError(#[from] RepositoryError),
}

#[cfg(test)]
mod test {
    use std::{
        collections::HashSet,
        sync::{Arc, Mutex},
    };

    use assert_matches::assert_matches;

    use super::*;
    use crate::{
        job::{subscriber::StatusChange, JobStatus},
        repository::{memory::InMemoryJobRepository, MockJobRepository},
    };

    fn manager() -> JobManager<InMemoryJobRepository> {
        JobManager::new(InMemoryJobRepository::new())
    }

    fn task() -> TaskId {
        TaskId::from(Job::DEFAULT_TASK)
    }

    #[tokio::test]
    async fn create_persists_job() {
        let manager = manager();

        let job = manager.create(&task(), []).await.unwrap();

        assert!(job.id().as_str().starts_with("JOB_"));
        assert_eq!(job.task_id(), &task());
        assert!(job.is_submitted());
        assert_eq!(manager.get(job.id()).await.unwrap(), job);
    }

    #[tokio::test]
    async fn create_generates_unique_ids() {
        let manager = manager();
        let task = task();

        let jobs = futures::future::try_join_all((0..100).map(|_| manager.create(&task, [])))
            .await
            .unwrap();

        let ids: HashSet<_> = jobs.iter().map(|job| job.id().clone()).collect();
        assert_eq!(ids.len(), 100);
        assert_eq!(manager.get_all().await.unwrap().len(), 100);
    }

    #[tokio::test]
    async fn create_registers_callbacks_in_order() {
        let manager = manager();
        let calls = Arc::new(Mutex::new(vec![]));
        let callback = |name: &'static str| {
            let calls = calls.clone();
            Subscriber::from_fn(move |_: &Job, change: &StatusChange| {
                calls.lock().unwrap().push((name, change.current))
            })
        };

        let mut job = manager
            .create(&task(), [callback("c1"), callback("c2")])
            .await
            .unwrap();
        job.mark_running().unwrap();
        job.mark_completed().unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                ("c1", JobStatus::Running),
                ("c2", JobStatus::Running),
                ("c1", JobStatus::Completed),
                ("c2", JobStatus::Completed),
            ]
        );
    }

    #[tokio::test]
    async fn create_saves_once() {
        let mut repository = MockJobRepository::new();
        repository
            .expect_save()
            .withf(|job: &Job| job.is_submitted())
            .times(1)
            .returning(|_| Ok(()));

        let job = JobManager::new(repository).create(&task(), []).await;

        assert!(job.is_ok());
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let manager = manager();
        let mut job = manager.create(&task(), []).await.unwrap();

        job.mark_failed("out of memory").unwrap();
        manager.set(&job).await.unwrap();

        let loaded = manager.get(job.id()).await.unwrap();
        assert_eq!(loaded, job);
        assert!(loaded.is_failed());
        assert_eq!(loaded.stacktrace(), ["out of memory".to_owned()]);
    }

    #[tokio::test]
    async fn get_non_existing_job() {
        let manager = manager();
        let id = JobId::from("JOB_nonexistent");

        assert_matches!(
            manager.get(&id).await,
            Err(JobManagerError::NonExistingJob(missing)) if missing == id
        );
    }

    #[tokio::test]
    async fn get_all_empty() {
        assert!(manager().get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repository_errors_propagate() {
        let mut repository = MockJobRepository::new();
        repository
            .expect_load()
            .returning(|_| Err(RepositoryError::BadState));
        repository
            .expect_load_all()
            .returning(|| Err(RepositoryError::BadState));
        let manager = JobManager::new(repository);

        assert_matches!(
            manager.get(&JobId::generate()).await,
            Err(JobManagerError::RepositoryError(RepositoryError::BadState))
        );
        assert_matches!(
            manager.get_latest_job(&task()).await,
            Err(JobManagerError::RepositoryError(RepositoryError::BadState))
        );
    }

    #[tokio::test]
    async fn delete_unfinished_job_refused() {
        let manager = manager();
        let mut job = manager.create(&task(), []).await.unwrap();

        for status in [JobStatus::Blocked, JobStatus::Pending, JobStatus::Running] {
            job.set_status(status).unwrap();
            manager.set(&job).await.unwrap();

            assert_matches!(
                manager.delete(&job, false).await,
                Err(JobManagerError::JobNotDeleted(id)) if &id == job.id()
            );
            assert_eq!(manager.get(job.id()).await.unwrap(), job);
        }
    }

    #[tokio::test]
    async fn delete_unfinished_job_never_reaches_repository() {
        let mut repository = MockJobRepository::new();
        repository.expect_delete().never();

        let result = JobManager::new(repository)
            .delete(&Job::raw_job(), false)
            .await;

        assert_matches!(result, Err(JobManagerError::JobNotDeleted(_)));
    }

    #[tokio::test]
    async fn delete_finished_jobs() {
        let manager = manager();

        for status in [JobStatus::Completed, JobStatus::Failed, JobStatus::Canceled] {
            let mut job = manager.create(&task(), []).await.unwrap();
            job.set_status(status).unwrap();
            manager.set(&job).await.unwrap();

            manager.delete(&job, false).await.unwrap();

            assert_matches!(
                manager.get(job.id()).await,
                Err(JobManagerError::NonExistingJob(_))
            );
        }
    }

    #[tokio::test]
    async fn force_delete_unfinished_job() {
        let manager = manager();
        let mut job = manager.create(&task(), []).await.unwrap();
        job.mark_running().unwrap();
        manager.set(&job).await.unwrap();

        manager.delete(&job, true).await.unwrap();

        assert_matches!(
            manager.get(job.id()).await,
            Err(JobManagerError::NonExistingJob(_))
        );
    }

    #[tokio::test]
    async fn delete_all_ignores_status() {
        let manager = manager();
        let mut running = manager.create(&task(), []).await.unwrap();
        running.mark_running().unwrap();
        manager.set(&running).await.unwrap();
        manager.create(&TaskId::from("another_task"), []).await.unwrap();

        manager.delete_all().await.unwrap();

        assert!(manager.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_latest_job() {
        let manager = manager();
        let task = task();
        let mut job1 = manager.create(&task, []).await.unwrap();
        let mut job2 = manager.create(&task, []).await.unwrap();
        manager.create(&TaskId::from("another_task"), []).await.unwrap();

        assert_eq!(manager.get_latest_job(&task).await.unwrap(), job2);

        job2.mark_completed().unwrap();
        manager.delete(&job2, false).await.unwrap();
        assert_eq!(manager.get_latest_job(&task).await.unwrap(), job1);

        job1.mark_canceled().unwrap();
        manager.set(&job1).await.unwrap();
        assert_eq!(manager.get_latest_job(&task).await.unwrap(), job1);
    }

    #[tokio::test]
    async fn get_latest_job_without_jobs() {
        let manager = manager();
        manager.create(&TaskId::from("another_task"), []).await.unwrap();

        assert_matches!(
            manager.get_latest_job(&task()).await,
            Err(JobManagerError::NoJobForTask(task_id)) if task_id == task()
        );
    }

    #[tokio::test]
    async fn get_jobs_for_task_oldest_first() {
        let manager = manager();
        let task = task();
        let job1 = manager.create(&task, []).await.unwrap();
        manager.create(&TaskId::from("another_task"), []).await.unwrap();
        let job2 = manager.create(&task, []).await.unwrap();

        assert_eq!(
            manager.get_jobs_for_task(&task).await.unwrap(),
            [job1, job2]
        );
        assert!(manager
            .get_jobs_for_task(&TaskId::from("unknown"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn shared_repository_handle() {
        let repository: Arc<dyn JobRepository> = Arc::new(InMemoryJobRepository::new());
        let manager1 = JobManager::new(repository.clone());
        let manager2 = JobManager::new(repository);

        let job = manager1.create(&task(), []).await.unwrap();

        assert_eq!(manager2.get(job.id()).await.unwrap(), job);
    }
}
