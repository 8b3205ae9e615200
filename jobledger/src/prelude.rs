//! The purpose of this module is to alleviate the need to import many of the `[jobledger]` types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use jobledger::prelude::*;
//! ```
pub use crate::job::subscriber::{StatusChange, StatusSubscriber, Subscriber, SubscriberError};
pub use crate::job::{Job, JobId, JobStatus, StatusError};
pub use crate::repository::{JobRepository, RepositoryError};
pub use crate::task::{Task, TaskId};
pub use crate::{JobManager, JobManagerError};
