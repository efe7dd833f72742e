//! The `Runner`: the worker pool tasks are invoked on, and the entry points
//! for sequential and parallel runs.
//!
//! A runner never blocks the calling thread. Every task invocation is handed to
//! the runner's pool and the terminal callback is called from whichever thread
//! finalizes the run: a worker that reported the last outcome, or the timer.
//!
//! Most callers can use the free functions [`run_sequential`] and
//! [`run_parallel`], which go through a lazily created, shared runner. Build a
//! dedicated one with [`Runner::builder`] to control the pool.
use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::OnceLock,
};

use futures::executor::{ThreadPool, ThreadPoolBuilder};

use crate::{
    Outcome, ParallelResults, ParallelTasks, RunnerError, Sequence, StepError, Timeout, parallel,
    step,
};

static GLOBAL: OnceLock<Runner> = OnceLock::new();

const DEFAULT_POOL_SIZE: usize = 40;
const DEFAULT_NAME_PREFIX: &str = "asyncstep-worker-";

/// Why a run finalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Finish {
    /// Every task reported.
    Completed,
    /// A sequential step failed.
    Failed,
    /// A parallel task with stop-on-failure set failed.
    StopOnFailure,
    /// The run-wide timer fired first.
    TimedOut,
}

impl Finish {
    // Natural completion leaves the flag down; every other path tears the run down.
    pub(crate) fn cancels(self) -> bool {
        !matches!(self, Finish::Completed)
    }
}

impl fmt::Display for Finish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finish::Completed => write!(f, "completed"),
            Finish::Failed => write!(f, "failed"),
            Finish::StopOnFailure => write!(f, "stopped on failure"),
            Finish::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Configures and creates a [`Runner`].
#[derive(Clone, Debug)]
#[must_use]
pub struct RunnerBuilder {
    pool_size: usize,
    name_prefix: String,
}

impl RunnerBuilder {
    /// Number of worker threads tasks are invoked on. Defaults to 40.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Prefix of the worker thread names.
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Creates the runner and its worker pool.
    ///
    /// # Errors
    ///
    /// - [`RunnerError::EmptyPool`] if the pool size is zero.
    /// - [`RunnerError::PoolCreation`] if the worker threads could not be spawned.
    pub fn build(self) -> Result<Runner, RunnerError> {
        if self.pool_size == 0 {
            return Err(RunnerError::EmptyPool);
        }
        let pool = ThreadPoolBuilder::new()
            .pool_size(self.pool_size)
            .name_prefix(self.name_prefix)
            .create()
            .map_err(RunnerError::PoolCreation)?;
        Ok(Runner { pool })
    }
}

impl Default for RunnerBuilder {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            name_prefix: DEFAULT_NAME_PREFIX.to_owned(),
        }
    }
}

/// Executes sequences and parallel task sets on a pool of worker threads.
///
/// Cloning a runner is cheap and shares the pool.
#[derive(Clone)]
pub struct Runner {
    pool: ThreadPool,
}

impl Runner {
    /// Returns a builder for a runner with its own pool.
    pub fn builder() -> RunnerBuilder {
        RunnerBuilder::default()
    }

    /// The shared runner used by [`run_sequential`] and [`run_parallel`].
    ///
    /// # Panics
    ///
    /// If the shared pool cannot be created on first use. Use
    /// [`try_global`](Self::try_global) to handle that failure instead.
    pub fn global() -> &'static Runner {
        Self::try_global().expect("Thread pool creation failed")
    }

    /// The shared runner, created with the default configuration on first use.
    ///
    /// # Errors
    ///
    /// [`RunnerError::PoolCreation`] if the shared pool could not be created.
    /// A later call tries again.
    pub fn try_global() -> Result<&'static Runner, RunnerError> {
        if let Some(runner) = GLOBAL.get() {
            return Ok(runner);
        }
        let runner = Runner::builder().build()?;
        // Racing initializers: the first one stored wins, the others are dropped.
        Ok(GLOBAL.get_or_init(|| runner))
    }

    /// Runs `steps` one after another, feeding each step the result of the
    /// previous one, and calls `completion` exactly once.
    ///
    /// `completion` receives:
    /// - `Ok(None)` right away if `steps` is empty,
    /// - `Ok(Some(result))` with the last step's result if every step succeeded,
    /// - `Err(StepError::Task(e))` with the first step error, after which no
    ///   further step is started,
    /// - `Err(StepError::TimedOut(_))` if `timeout` elapsed first. The step
    ///   in flight is told through its [`CancellationFlag`](crate::CancellationFlag)
    ///   and whatever it reports afterwards is ignored.
    pub fn run_sequential<T, E>(
        &self,
        steps: Sequence<T, E>,
        timeout: impl Into<Timeout>,
        completion: impl FnOnce(Result<Option<T>, StepError<E>>) + Send + 'static,
    ) where
        T: Send + 'static,
        E: Send + 'static,
    {
        step::start(self.clone(), steps, timeout.into(), Box::new(completion));
    }

    /// Starts every task in `tasks` concurrently and calls `completion`
    /// exactly once with the collected [`ParallelResults`].
    ///
    /// The run finalizes on the first of:
    /// - every task has reported,
    /// - a task registered with stop-on-failure reported an error,
    /// - `timeout` elapsed, in which case
    ///   [`has_timed_out`](ParallelResults::has_timed_out) is set.
    ///
    /// Reports arriving after that are ignored. An empty registry completes
    /// right away with an empty snapshot.
    pub fn run_parallel<T, E>(
        &self,
        tasks: ParallelTasks<T, E>,
        timeout: impl Into<Timeout>,
        completion: impl FnOnce(ParallelResults<T, E>) + Send + 'static,
    ) where
        T: Send + 'static,
        E: Send + 'static,
    {
        parallel::start(self.clone(), tasks, timeout.into(), Box::new(completion));
    }

    /// Async flavor of [`run_sequential`](Self::run_sequential).
    ///
    /// The returned future works with any executor. It resolves to
    /// [`StepError::Abandoned`] if the run can never finish because the step in
    /// flight dropped its [`Next`](crate::Next) and no timeout was set.
    pub fn sequence<T, E>(
        &self,
        steps: Sequence<T, E>,
        timeout: impl Into<Timeout>,
    ) -> Outcome<Result<Option<T>, StepError<E>>>
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        let (outcome, sender) = Outcome::channel(|| Err(StepError::from(crate::Abandoned)));
        self.run_sequential(steps, timeout, move |result| {
            let _ = sender.send(result);
        });
        outcome
    }

    /// Async flavor of [`run_parallel`](Self::run_parallel).
    ///
    /// Resolves to [`Abandoned`](crate::Abandoned) if the run can never finish
    /// because a task dropped its [`Completion`](crate::Completion) and no
    /// timeout was set.
    pub fn parallel<T, E>(
        &self,
        tasks: ParallelTasks<T, E>,
        timeout: impl Into<Timeout>,
    ) -> Outcome<Result<ParallelResults<T, E>, crate::Abandoned>>
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        let (outcome, sender) = Outcome::channel(|| Err(crate::Abandoned));
        self.run_parallel(tasks, timeout, move |results| {
            let _ = sender.send(Ok(results));
        });
        outcome
    }

    // Invokes `job` on a worker. A panicking job is logged and swallowed so
    // that the worker survives; whatever continuation it held is dropped.
    pub(crate) fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        self.pool.spawn_ok(async move {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_owned());
                tracing::error!(panic = %message, "task panicked");
            }
        });
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner").finish_non_exhaustive()
    }
}

/// Runs `steps` on the shared [`Runner`]. See [`Runner::run_sequential`].
///
/// # Panics
///
/// If the shared runner cannot be created; see [`Runner::global`].
pub fn run_sequential<T, E>(
    steps: Sequence<T, E>,
    timeout: impl Into<Timeout>,
    completion: impl FnOnce(Result<Option<T>, StepError<E>>) + Send + 'static,
) where
    T: Send + 'static,
    E: Send + 'static,
{
    Runner::global().run_sequential(steps, timeout, completion);
}

/// Runs `tasks` on the shared [`Runner`]. See [`Runner::run_parallel`].
///
/// # Panics
///
/// If the shared runner cannot be created; see [`Runner::global`].
pub fn run_parallel<T, E>(
    tasks: ParallelTasks<T, E>,
    timeout: impl Into<Timeout>,
    completion: impl FnOnce(ParallelResults<T, E>) + Send + 'static,
) where
    T: Send + 'static,
    E: Send + 'static,
{
    Runner::global().run_parallel(tasks, timeout, completion);
}
