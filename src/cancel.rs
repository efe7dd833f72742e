//! One-shot, advisory cancellation signal shared between a run and its tasks.
//!
//! A run owns the single [`Canceller`] and hands out any number of
//! [`CancellationFlag`] readers. Once raised the flag never goes back down.
//! Tasks are free to ignore it; the runner never forces a task to return.
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Read side of a run's cancellation signal.
///
/// Passed to every sequential step and reachable from every parallel
/// [`Completion`](crate::Completion). Long running tasks should poll
/// [`is_cancelled`](Self::is_cancelled) and wind down early once it returns
/// `true`, but they still have to report through their continuation.
#[derive(Clone, Debug)]
pub struct CancellationFlag {
    canceled: Arc<AtomicBool>,
}

impl CancellationFlag {
    /// Returns `true` once the run has been torn down, either because its
    /// timeout fired or because a task failed and stopped the run.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

// Single writer. Only the run holds one, so the flag can't be raised from a task.
#[derive(Debug)]
pub(crate) struct Canceller {
    canceled: Arc<AtomicBool>,
}

impl Canceller {
    pub(crate) fn new() -> Self {
        Self {
            canceled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn flag(&self) -> CancellationFlag {
        CancellationFlag {
            canceled: Arc::clone(&self.canceled),
        }
    }

    pub(crate) fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }
}
