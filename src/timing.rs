//! Run-wide timeout configuration and the one-shot timer that enforces it.
//!
//! Every run arms at most one [`Timer`] when it starts. The timer waits on its
//! own thread so that long timeouts never occupy a worker of the task pool, and
//! it can be disarmed at any point, in which case the thread wakes up and exits
//! without firing.

use std::{
    sync::{Arc, Condvar, Mutex, PoisonError},
    thread,
    time::{Duration, Instant},
};

/// Wall-clock limit applied to a whole run, measured from the moment it starts.
///
/// A run without a limit waits for its tasks for as long as it takes. Zero,
/// negative, `NaN` and infinite second counts all mean "no limit".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[must_use]
pub struct Timeout(Option<Duration>);

impl Timeout {
    /// No time limit.
    pub const fn none() -> Self {
        Self(None)
    }

    /// Builds a timeout from fractional seconds. Values too large for a
    /// [`Duration`] also mean "no limit".
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_finite() && secs > 0.0 {
            Self(Duration::try_from_secs_f64(secs).ok())
        } else {
            Self(None)
        }
    }

    /// Returns the limit, or `None` if the run is unbounded.
    #[must_use]
    pub const fn duration(&self) -> Option<Duration> {
        self.0
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        if duration.is_zero() {
            Self(None)
        } else {
            Self(Some(duration))
        }
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(Self::none(), Self::from)
    }
}

#[derive(Default)]
struct TimerState {
    disarmed: bool,
}

/// A one-shot timer. Dropping it without calling [`disarm`](Self::disarm)
/// leaves it armed.
pub(crate) struct Timer {
    state: Arc<(Mutex<TimerState>, Condvar)>,
}

impl Timer {
    /// Arms a timer that calls `on_fire` once `after` has elapsed, unless it
    /// is disarmed first.
    ///
    /// Returns `None` without arming anything if the deadline lies beyond what
    /// an [`Instant`] can represent; such a run is unbounded.
    pub(crate) fn arm(after: Duration, on_fire: impl FnOnce() + Send + 'static) -> Option<Self> {
        let Some(deadline) = Instant::now().checked_add(after) else {
            tracing::debug!(?after, "timeout beyond the clock's range, not enforced");
            return None;
        };
        let state = Arc::new((Mutex::new(TimerState::default()), Condvar::new()));
        let waiter = Arc::clone(&state);

        let spawned = thread::Builder::new()
            .name("asyncstep-timer".into())
            .spawn(move || {
                let (lock, cvar) = &*waiter;
                let mut guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
                // Loop to ride out spurious wakeups.
                loop {
                    if guard.disarmed {
                        return;
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    guard = cvar
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                drop(guard);
                tracing::trace!(?after, "timer fired");
                on_fire();
            });

        if let Err(e) = spawned {
            // Without a timer thread the run can only end naturally.
            tracing::error!(error = %e, "failed to spawn timer thread, timeout will not be enforced");
        }
        Some(Self { state })
    }

    /// Disarms the timer. Harmless if it already fired.
    pub(crate) fn disarm(self) {
        let (lock, cvar) = &*self.state;
        lock.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .disarmed = true;
        cvar.notify_one();
    }
}
