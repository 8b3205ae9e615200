//! Test suite for ensuring a correct implementation of a job repository.
use std::collections::HashSet;

use crate::job::JobStatus;

use super::*;

const DEFAULT_TASK: &str = "task";

fn mock_job() -> Job {
    Job::new(JobId::generate(), DEFAULT_TASK.into())
}

/// Create test suite for a [`JobRepository`] implementation.
///
/// For repository implementors, it is useful to include this as part of your test suites.
///
/// # Example
///
/// ```
/// use jobledger::test_suite;
/// use jobledger::repository::memory::InMemoryJobRepository;
/// test_suite!(for: InMemoryJobRepository::new());
/// ```
///
/// If you are using a different async test attribute you can configure the macro to use that
/// instead. For example when using `sqlx::test` you could do the following:
///
/// ```ignore
/// use jobledger::test_suite;
/// test_suite!(
///     attr: sqlx::test,
///     args: (pool: PgPool),
///     repository: RepositoryImplementation::from_pool(pool).await.unwrap()
/// );
/// ```
#[macro_export]
macro_rules! test_suite {
    (for: $repository:expr) => {
        test_suite!(attr: tokio::test, args: (), repository: $repository);
    };
    (attr: $attr:meta, args: $args:tt, repository: $repository:expr) => {
        #[$attr]
        async fn save_and_load $args {
          let repository = $repository;
          $crate::repository::testing::save_and_load(repository).await;
        }
        #[$attr]
        async fn save_overwrites_existing $args {
          let repository = $repository;
          $crate::repository::testing::save_overwrites_existing(repository).await;
        }
        #[$attr]
        async fn save_concurrently $args {
          let repository = $repository;
          $crate::repository::testing::save_concurrently(repository).await;
        }
        #[$attr]
        async fn load_not_found $args {
          let repository = $repository;
          $crate::repository::testing::load_not_found(repository).await;
        }
        #[$attr]
        async fn load_all $args {
          let repository = $repository;
          $crate::repository::testing::load_all(repository).await;
        }
        #[$attr]
        async fn load_all_empty $args {
          let repository = $repository;
          $crate::repository::testing::load_all_empty(repository).await;
        }
        #[$attr]
        async fn delete $args {
          let repository = $repository;
          $crate::repository::testing::delete(repository).await;
        }
        #[$attr]
        async fn delete_all $args {
          let repository = $repository;
          $crate::repository::testing::delete_all(repository).await;
        }
    };
}

pub use test_suite;

#[doc(hidden)]
pub async fn save_and_load(repository: impl JobRepository) {
    let mut job = mock_job();
    job.mark_failed("boom").unwrap();

    repository.save(&job).await.unwrap();
    let loaded = repository.load(job.id()).await.unwrap();

    assert_eq!(loaded, job);
    assert_eq!(loaded.creation_order(), job.creation_order());
    assert_eq!(loaded.stacktrace(), ["boom".to_owned()]);
}

#[doc(hidden)]
pub async fn save_overwrites_existing(repository: impl JobRepository) {
    let mut job = mock_job();
    repository.save(&job).await.unwrap();

    job.mark_running().unwrap();
    repository.save(&job).await.unwrap();

    let loaded = repository.load(job.id()).await.unwrap();
    assert_eq!(loaded.status(), JobStatus::Running);
    assert_eq!(repository.load_all().await.unwrap().len(), 1);
}

#[doc(hidden)]
pub async fn save_concurrently(repository: impl JobRepository) {
    let jobs: Vec<_> = (0..50).map(|_| mock_job()).collect();

    futures::future::try_join_all(jobs.iter().map(|job| repository.save(job)))
        .await
        .unwrap();

    let ids: HashSet<_> = repository
        .load_all()
        .await
        .unwrap()
        .into_iter()
        .map(|job| job.id().clone())
        .collect();
    let expected: HashSet<_> = jobs.iter().map(|job| job.id().clone()).collect();
    assert_eq!(ids, expected);
}

#[doc(hidden)]
pub async fn load_not_found(repository: impl JobRepository) {
    let id = JobId::from("JOB_nonexistent");

    let result = repository.load(&id).await;

    assert!(
        matches!(result, Err(RepositoryError::JobNotFound(ref missing)) if missing == &id),
        "Expected JobNotFound, got {result:?}"
    );
}

#[doc(hidden)]
pub async fn load_all(repository: impl JobRepository) {
    let job1 = mock_job();
    let job2 = Job::new(JobId::generate(), "another_task".into());
    repository.save(&job1).await.unwrap();
    repository.save(&job2).await.unwrap();

    let mut jobs = repository.load_all().await.unwrap();
    jobs.sort_by_key(Job::creation_order);

    assert_eq!(jobs, [job1, job2]);
}

#[doc(hidden)]
pub async fn load_all_empty(repository: impl JobRepository) {
    assert!(repository.load_all().await.unwrap().is_empty());
}

#[doc(hidden)]
pub async fn delete(repository: impl JobRepository) {
    let job1 = mock_job();
    let job2 = mock_job();
    repository.save(&job1).await.unwrap();
    repository.save(&job2).await.unwrap();

    repository.delete(job1.id()).await.unwrap();

    assert!(matches!(
        repository.load(job1.id()).await,
        Err(RepositoryError::JobNotFound(_))
    ));
    assert_eq!(repository.load(job2.id()).await.unwrap(), job2);
}

#[doc(hidden)]
pub async fn delete_all(repository: impl JobRepository) {
    repository.save(&mock_job()).await.unwrap();
    repository.save(&mock_job()).await.unwrap();

    repository.delete_all().await.unwrap();

    assert!(repository.load_all().await.unwrap().is_empty());
}
