//! Provides an in memory implementation of [`JobRepository`].
//!
//! Jobs are kept in their serialized form, so as with any persistent repository a loaded job is a
//! fresh value: subscribers registered on the saved job are not carried over.
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use fxhash::FxHashMap;

use super::{JobRepository, RepositoryError};
use crate::job::{Job, JobId};

/// An in memory implementation of [`JobRepository`].
///
/// Cloning the repository gives another handle onto the same underlying storage.
#[derive(Clone, Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<RwLock<FxHashMap<JobId, serde_json::Value>>>,
}

impl InMemoryJobRepository {
    /// Creates a new, empty, instance of [`InMemoryJobRepository`].
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of jobs currently stored.
    pub fn len(&self) -> Result<usize, RepositoryError> {
        Ok(self.jobs.read().map_err(|_| RepositoryError::BadState)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, RepositoryError> {
        Ok(self.len()? == 0)
    }
}

impl std::fmt::Debug for InMemoryJobRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryJobRepository")
            .field("jobs", &self.len().ok())
            .finish()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        let value = serde_json::to_value(job)?;
        self.jobs
            .write()
            .map_err(|_| RepositoryError::BadState)?
            .insert(job.id().clone(), value);
        Ok(())
    }
    async fn load(&self, id: &JobId) -> Result<Job, RepositoryError> {
        let value = self
            .jobs
            .read()
            .map_err(|_| RepositoryError::BadState)?
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::JobNotFound(id.clone()))?;
        Ok(serde_json::from_value(value)?)
    }
    async fn load_all(&self) -> Result<Vec<Job>, RepositoryError> {
        let values: Vec<_> = self
            .jobs
            .read()
            .map_err(|_| RepositoryError::BadState)?
            .values()
            .cloned()
            .collect();
        Ok(values
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()?)
    }
    async fn delete(&self, id: &JobId) -> Result<(), RepositoryError> {
        self.jobs
            .write()
            .map_err(|_| RepositoryError::BadState)?
            .remove(id);
        Ok(())
    }
    async fn delete_all(&self) -> Result<(), RepositoryError> {
        self.jobs
            .write()
            .map_err(|_| RepositoryError::BadState)?
            .clear();
        Ok(())
    }
}
