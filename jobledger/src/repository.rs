//! The persistence seam of the job lifecycle.
//!
//! The [`JobManager`](crate::JobManager) holds no state of its own, everything lives in a
//! [`JobRepository`]. Implementations must make each individual operation atomic per job, i.e. a
//! job record is never observed half written, but no cross call transactions are assumed.
//!
//! [`memory::InMemoryJobRepository`] is provided for tests and for embedding. Implementors of
//! other repositories can check their implementation against [`crate::test_suite`].
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::{Job, JobId};

pub mod memory;
#[doc(hidden)]
pub mod testing;

/// Key addressed storage for jobs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Inserts or replaces the job with the same id.
    async fn save(&self, job: &Job) -> Result<(), RepositoryError>;
    /// Loads the job with the given id, returning [`RepositoryError::JobNotFound`] if absent.
    async fn load(&self, id: &JobId) -> Result<Job, RepositoryError>;
    /// Loads every job. The order of the returned jobs is implementation defined.
    async fn load_all(&self) -> Result<Vec<Job>, RepositoryError>;
    /// Removes the job with the given id.
    ///
    /// Removing a job which does not exist may either succeed or return
    /// [`RepositoryError::JobNotFound`].
    async fn delete(&self, id: &JobId) -> Result<(), RepositoryError>;
    async fn delete_all(&self) -> Result<(), RepositoryError>;
}

#[async_trait]
impl<R> JobRepository for Arc<R>
where
    R: JobRepository + ?Sized,
{
    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        self.as_ref().save(job).await
    }
    async fn load(&self, id: &JobId) -> Result<Job, RepositoryError> {
        self.as_ref().load(id).await
    }
    async fn load_all(&self) -> Result<Vec<Job>, RepositoryError> {
        self.as_ref().load_all().await
    }
    async fn delete(&self, id: &JobId) -> Result<(), RepositoryError> {
        self.as_ref().delete(id).await
    }
    async fn delete_all(&self) -> Result<(), RepositoryError> {
        self.as_ref().delete_all().await
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RepositoryError {
    #[error("Job {0} not found")]
    JobNotFound(JobId),
    #[error("Error encoding or decoding job")]
    EncodeDecodeError(#[from] serde_json::Error),
    #[error("System in bad state")]
    BadState,
}
