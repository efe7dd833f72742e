//! Sequential runs: steps executed one at a time, each receiving the result
//! of the one before it.
//!
//! Only one step is ever in flight. When it reports through its [`Next`], the
//! run either finalizes (error, or last step) or hands the result to the next
//! step on a worker. A single timer races against this chain; whichever side
//! takes the completion out of the run state first wins, and the other side
//! finds nothing left to deliver.
use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::{
    CancellationFlag, StepError, Timeout,
    cancel::Canceller,
    runner::{Finish, Runner},
    timing::Timer,
};

/// A unit of work for a sequential run.
///
/// It receives the previous step's result (`None` for the first step), the
/// run's [`CancellationFlag`] and the [`Next`] it must report through exactly
/// once.
pub type StepTask<T, E> =
    Box<dyn FnOnce(Option<T>, CancellationFlag, Next<T, E>) + Send + 'static>;

pub(crate) type SequenceCompletion<T, E> =
    Box<dyn FnOnce(Result<Option<T>, StepError<E>>) + Send + 'static>;

/// An ordered list of steps.
///
/// # Example
/// ```
/// # use asyncstep::Sequence;
/// let steps = Sequence::<u32, String>::new()
///     .then(|_, _, next| next.ok(1))
///     .then(|previous, _, next| next.ok(previous.unwrap_or_default() + 1));
///
/// assert_eq!(steps.len(), 2);
/// ```
#[must_use]
pub struct Sequence<T, E> {
    steps: VecDeque<StepTask<T, E>>,
}

impl<T, E> Sequence<T, E> {
    /// Creates a sequence with no steps.
    pub fn new() -> Self {
        Self {
            steps: VecDeque::with_capacity(8),
        }
    }

    /// Appends a step.
    pub fn then(
        mut self,
        step: impl FnOnce(Option<T>, CancellationFlag, Next<T, E>) + Send + 'static,
    ) -> Self {
        self.push(step);
        self
    }

    /// Appends a step in place.
    pub fn push(
        &mut self,
        step: impl FnOnce(Option<T>, CancellationFlag, Next<T, E>) + Send + 'static,
    ) -> &mut Self {
        self.steps.push_back(Box::new(step));
        self
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if the sequence has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<T, E> Default for Sequence<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> From<Vec<StepTask<T, E>>> for Sequence<T, E> {
    fn from(steps: Vec<StepTask<T, E>>) -> Self {
        Self {
            steps: steps.into(),
        }
    }
}

impl<T, E> FromIterator<StepTask<T, E>> for Sequence<T, E> {
    fn from_iter<I: IntoIterator<Item = StepTask<T, E>>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

impl<T, E> fmt::Debug for Sequence<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("steps", &self.steps.len())
            .finish()
    }
}

struct SequenceState<T, E> {
    remaining: VecDeque<StepTask<T, E>>,
    // `Some` until the run finalizes. Taking it is the finalize gate.
    completion: Option<SequenceCompletion<T, E>>,
    timer: Option<Timer>,
    position: usize,
}

struct SequenceRun<T, E> {
    state: Mutex<SequenceState<T, E>>,
    canceller: Canceller,
    runner: Runner,
}

// Everything taken out of the run state by the path that won the finalize race.
struct Terminal<T, E> {
    completion: SequenceCompletion<T, E>,
    timer: Option<Timer>,
    leftover: VecDeque<StepTask<T, E>>,
}

impl<T, E> SequenceRun<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn lock(&self) -> MutexGuard<'_, SequenceState<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(self: &Arc<Self>, position: usize, step: StepTask<T, E>, previous: Option<T>) {
        let next = Next {
            run: Arc::clone(self),
            position,
            reported: false,
        };
        let flag = self.canceller.flag();
        tracing::trace!(position, "dispatching step");
        self.runner.spawn(move || step(previous, flag, next));
    }

    fn advance(self: &Arc<Self>, position: usize, outcome: Result<T, E>) {
        let mut state = self.lock();
        if state.completion.is_none() {
            tracing::trace!(position, "step reported after the run finalized, ignoring");
            return;
        }
        match outcome {
            Err(e) => {
                let terminal = Self::take_terminal(&mut state);
                drop(state);
                self.deliver(terminal, Finish::Failed, Err(StepError::Task(e)));
            }
            Ok(value) => match state.remaining.pop_front() {
                None => {
                    let terminal = Self::take_terminal(&mut state);
                    drop(state);
                    self.deliver(terminal, Finish::Completed, Ok(Some(value)));
                }
                Some(step) => {
                    state.position += 1;
                    let position = state.position;
                    drop(state);
                    self.dispatch(position, step, Some(value));
                }
            },
        }
    }

    fn time_out(&self, after: Duration) {
        let mut state = self.lock();
        if state.completion.is_none() {
            return;
        }
        let position = state.position;
        let terminal = Self::take_terminal(&mut state);
        drop(state);
        tracing::debug!(position, ?after, "sequential run timed out");
        self.deliver(terminal, Finish::TimedOut, Err(StepError::TimedOut(after)));
    }

    fn take_terminal(state: &mut SequenceState<T, E>) -> Option<Terminal<T, E>> {
        let completion = state.completion.take()?;
        Some(Terminal {
            completion,
            timer: state.timer.take(),
            leftover: std::mem::take(&mut state.remaining),
        })
    }

    // Runs outside the state lock so user code never executes while it is held.
    fn deliver(
        &self,
        terminal: Option<Terminal<T, E>>,
        finish: Finish,
        result: Result<Option<T>, StepError<E>>,
    ) {
        let Some(Terminal {
            completion,
            timer,
            leftover,
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
        tracing::debug!(%finish, skipped = leftover.len(), "sequential run finalized");
        drop(leftover);
        completion(result);
    }
}

/// The continuation handed to a sequential step.
///
/// Consumed by reporting, so a step can report at most once. A `Next` that is
/// dropped without reporting leaves the run waiting for its timeout.
#[must_use = "the run only moves on once the step reports through `Next`"]
pub struct Next<T, E> {
    run: Arc<SequenceRun<T, E>>,
    position: usize,
    reported: bool,
}

impl<T, E> Next<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Reports the step's outcome.
    ///
    /// `Ok` hands the value to the next step, or finishes the run if this was
    /// the last one. `Err` finishes the run with [`StepError::Task`]. If the run
    /// already finalized, this does nothing.
    pub fn complete(mut self, outcome: Result<T, E>) {
        self.reported = true;
        self.run.advance(self.position, outcome);
    }

    /// Shorthand for `complete(Ok(value))`.
    pub fn ok(self, value: T) {
        self.complete(Ok(value));
    }

    /// Shorthand for `complete(Err(error))`.
    pub fn err(self, error: E) {
        self.complete(Err(error));
    }

    /// Zero-based position of the step this continuation belongs to.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// The run's cancellation flag.
    #[must_use]
    pub fn cancellation(&self) -> CancellationFlag {
        self.run.canceller.flag()
    }
}

impl<T, E> Drop for Next<T, E> {
    fn drop(&mut self) {
        if !self.reported {
            tracing::warn!(
                position = self.position,
                "step dropped its continuation without reporting"
            );
        }
    }
}

impl<T, E> fmt::Debug for Next<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

pub(crate) fn start<T, E>(
    runner: Runner,
    steps: Sequence<T, E>,
    timeout: Timeout,
    completion: SequenceCompletion<T, E>,
) where
    T: Send + 'static,
    E: Send + 'static,
{
    let mut remaining = steps.steps;
    tracing::debug!(steps = remaining.len(), timeout = ?timeout.duration(), "starting sequential run");

    let Some(first) = remaining.pop_front() else {
        completion(Ok(None));
        return;
    };

    let run = Arc::new(SequenceRun {
        state: Mutex::new(SequenceState {
            remaining,
            completion: Some(completion),
            timer: None,
            position: 0,
        }),
        canceller: Canceller::new(),
        runner,
    });

    if let Some(after) = timeout.duration() {
        let fired = Arc::clone(&run);
        if let Some(timer) = Timer::arm(after, move || fired.time_out(after)) {
            let mut state = run.lock();
            if state.completion.is_none() {
                // A very short timeout already fired; the first step never starts.
                return;
            }
            state.timer = Some(timer);
        }
    }

    run.dispatch(0, first, None);
}
