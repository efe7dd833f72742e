//! Error types surfaced by the runners and the task registry.
use std::time::Duration;

use thiserror::Error;

/// Terminal error of a sequential run.
///
/// Task errors are handed back untouched; the runner only looks at whether a
/// task failed, never at what it failed with.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StepError<E> {
    /// A step reported an error. No later step was started.
    #[error("step failed")]
    Task(E),

    /// The run-wide timeout elapsed before the last step reported.
    #[error("run timed out after {0:?}")]
    TimedOut(Duration),

    /// The run was dropped before it could finalize.
    #[error(transparent)]
    Abandoned(#[from] Abandoned),
}

impl<E> StepError<E> {
    /// Returns the task error, if this is one.
    pub fn into_task_error(self) -> Option<E> {
        match self {
            StepError::Task(e) => Some(e),
            _ => None,
        }
    }

    /// Returns `true` for [`StepError::TimedOut`].
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, StepError::TimedOut(_))
    }
}

/// Returned by the async API when every continuation of a run was dropped
/// without reporting and no timeout was armed, so the run can never finish.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("run was abandoned before it finalized")]
pub struct Abandoned;

/// Errors returned when looking tasks up in a [`ParallelTasks`](crate::ParallelTasks) registry.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No task is registered under the given identifier.
    #[error("no task registered for identifier `{0}`")]
    UnknownIdentifier(String),
}

/// Errors raised while building a [`Runner`](crate::Runner).
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The worker pool could not be created.
    #[error("failed to create worker pool")]
    PoolCreation(#[source] std::io::Error),

    /// A pool needs at least one worker.
    #[error("pool size must be greater than zero")]
    EmptyPool,
}
