//! Parallel runs: every registered task started at once, outcomes collected
//! into a [`ParallelResults`] snapshot.
//!
//! All reports and the timer funnel through one lock around the partial
//! outcome maps. The first path that finds the completion still present
//! finalizes: it moves the maps out, so nothing recorded later can leak into
//! the snapshot the caller already holds.
use std::{
    collections::HashMap,
    fmt, mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::{
    CancellationFlag, ParallelResults, ParallelTasks, Timeout,
    cancel::Canceller,
    runner::{Finish, Runner},
    timing::Timer,
};

pub(crate) type ParallelCompletion<T, E> = Box<dyn FnOnce(ParallelResults<T, E>) + Send + 'static>;

struct ParallelState<T, E> {
    results: HashMap<String, T>,
    errors: HashMap<String, E>,
    pending: usize,
    completion: Option<ParallelCompletion<T, E>>,
    timer: Option<Timer>,
}

struct ParallelRun<T, E> {
    identifiers: Vec<String>,
    state: Mutex<ParallelState<T, E>>,
    canceller: Canceller,
}

struct Terminal<T, E> {
    completion: ParallelCompletion<T, E>,
    timer: Option<Timer>,
    results: ParallelResults<T, E>,
}

impl<T, E> ParallelRun<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn lock(&self) -> MutexGuard<'_, ParallelState<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, identifier: String, stop_on_failure: bool, outcome: Result<T, E>) {
        let mut state = self.lock();
        if state.completion.is_none() {
            tracing::trace!(%identifier, "task reported after the run finalized, ignoring");
            return;
        }
        state.pending = state.pending.saturating_sub(1);
        let stop = match outcome {
            Ok(value) => {
                state.results.insert(identifier, value);
                false
            }
            Err(error) => {
                tracing::debug!(%identifier, stop_on_failure, "task failed");
                state.errors.insert(identifier, error);
                stop_on_failure
            }
        };

        let finish = if stop {
            Finish::StopOnFailure
        } else if state.pending == 0 {
            Finish::Completed
        } else {
            return;
        };
        let terminal = self.take_terminal(&mut state, false);
        drop(state);
        self.deliver(terminal, finish);
    }

    fn time_out(&self, after: Duration) {
        let mut state = self.lock();
        let pending = state.pending;
        let terminal = self.take_terminal(&mut state, true);
        drop(state);
        if terminal.is_some() {
            tracing::debug!(pending, ?after, "parallel run timed out");
        }
        self.deliver(terminal, Finish::TimedOut);
    }

    fn take_terminal(&self, state: &mut ParallelState<T, E>, timed_out: bool) -> Option<Terminal<T, E>> {
        let completion = state.completion.take()?;
        let results = ParallelResults::new(
            self.identifiers.clone(),
            mem::take(&mut state.results),
            mem::take(&mut state.errors),
            timed_out,
        );
        Some(Terminal {
            completion,
            timer: state.timer.take(),
            results,
        })
    }

    fn deliver(&self, terminal: Option<Terminal<T, E>>, finish: Finish) {
        let Some(Terminal {
            completion,
            timer,
            results,
        }) = terminal
        else {
            return;
        };
        if finish.cancels() {
            self.canceller.cancel();
        }
        if let Some(timer) = timer {
            timer.disarm();
        }
        tracing::debug!(
            %finish,
            failed = results.errors().len(),
            unfinished = results.unfinished().count(),
            "parallel run finalized"
        );
        completion(results);
    }
}

/// The completion handle handed to a parallel task.
///
/// Consumed by reporting, so a task can report at most once. A `Completion`
/// dropped without reporting keeps its slot open until the run times out.
#[must_use = "the run only counts a task as done once it reports through `Completion`"]
pub struct Completion<T, E> {
    run: Arc<ParallelRun<T, E>>,
    identifier: String,
    stop_on_failure: bool,
    reported: bool,
}

impl<T, E> Completion<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Reports the task's outcome. Ignored if the run already finalized.
    pub fn complete(mut self, outcome: Result<T, E>) {
        self.reported = true;
        let identifier = mem::take(&mut self.identifier);
        self.run.record(identifier, self.stop_on_failure, outcome);
    }

    /// Shorthand for `complete(Ok(value))`.
    pub fn ok(self, value: T) {
        self.complete(Ok(value));
    }

    /// Shorthand for `complete(Err(error))`.
    pub fn err(self, error: E) {
        self.complete(Err(error));
    }

    /// Identifier the task was registered under.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The run's cancellation flag. Raised when the run times out or a
    /// stop-on-failure task fails.
    #[must_use]
    pub fn cancellation(&self) -> CancellationFlag {
        self.run.canceller.flag()
    }
}

impl<T, E> Drop for Completion<T, E> {
    fn drop(&mut self) {
        if !self.reported {
            tracing::warn!(
                identifier = %self.identifier,
                "task dropped its completion without reporting"
            );
        }
    }
}

impl<T, E> fmt::Debug for Completion<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("identifier", &self.identifier)
            .field("stop_on_failure", &self.stop_on_failure)
            .finish_non_exhaustive()
    }
}

pub(crate) fn start<T, E>(
    runner: Runner,
    tasks: ParallelTasks<T, E>,
    timeout: Timeout,
    completion: ParallelCompletion<T, E>,
) where
    T: Send + 'static,
    E: Send + 'static,
{
    let entries = tasks.into_entries();
    tracing::debug!(tasks = entries.len(), timeout = ?timeout.duration(), "starting parallel run");

    if entries.is_empty() {
        completion(ParallelResults::empty());
        return;
    }

    let identifiers: Vec<String> = entries.iter().map(|(id, _)| id.clone()).collect();
    let run = Arc::new(ParallelRun {
        state: Mutex::new(ParallelState {
            results: HashMap::with_capacity(identifiers.len()),
            errors: HashMap::new(),
            pending: identifiers.len(),
            completion: Some(completion),
            timer: None,
        }),
        identifiers,
        canceller: Canceller::new(),
    });

    if let Some(after) = timeout.duration() {
        let fired = Arc::clone(&run);
        if let Some(timer) = Timer::arm(after, move || fired.time_out(after)) {
            let mut state = run.lock();
            if state.completion.is_none() {
                // A very short timeout already fired; nothing gets started.
                return;
            }
            state.timer = Some(timer);
        }
    }

    for (identifier, entry) in entries {
        let completion = Completion {
            run: Arc::clone(&run),
            identifier,
            stop_on_failure: entry.stop_on_failure,
            reported: false,
        };
        let task = entry.task;
        runner.spawn(move || task(completion));
    }
}
