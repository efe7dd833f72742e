//! Sequential and parallel composition of callback-driven tasks.
//!
//! `asyncstep` schedules caller-supplied units of work without running them
//! itself. A task is a closure that is handed a continuation and reports
//! through it once, right away or later from any thread. Two runners build
//! control flow out of such tasks:
//!
//! - a **sequential** run chains steps so that each one receives the previous
//!   step's result, and stops at the first error,
//! - a **parallel** run starts a registry of identified tasks at once and
//!   collects their outcomes into a [`ParallelResults`] snapshot, optionally
//!   stopping early when a task marked stop-on-failure fails.
//!
//! Both runs take a single wall-clock [`Timeout`] and hand every task a
//! [`CancellationFlag`] that is raised when the run is torn down. Cancellation
//! is advisory: tasks that ignore it keep running, and whatever they report
//! afterwards is dropped. Whatever happens, a run calls its terminal callback
//! exactly once.
//!
//! The crate does not depend on any particular async runtime. Tasks are
//! invoked on the [`Runner`]'s thread pool, and the async flavors
//! ([`Runner::sequence`], [`Runner::parallel`]) return plain futures that can
//! be awaited on any executor.
//!
//! # Example
//! ```
//! use asyncstep::{ParallelTasks, Runner, Sequence, Timeout};
//!
//! # futures::executor::block_on(async {
//! let runner = Runner::global();
//!
//! let steps = Sequence::<u32, String>::new()
//!     .then(|_, _, next| next.ok(20))
//!     .then(|previous, _, next| next.ok(previous.unwrap_or_default() + 22));
//! let total = runner.sequence(steps, Timeout::from_secs_f64(5.0)).await;
//! assert_eq!(total, Ok(Some(42)));
//!
//! let mut tasks = ParallelTasks::<u32, String>::new();
//! tasks
//!     .add_task("left", |done| done.ok(1))
//!     .add_task("right", |done| done.err("unavailable".into()));
//! let results = runner.parallel(tasks, Timeout::none()).await.unwrap();
//! assert_eq!(results.result_for_identifier("left"), Some(&1));
//! assert!(results.errors().contains_key("right"));
//! # });
//! ```
#![warn(missing_docs)]

mod cancel;
mod error;
mod outcome;
pub mod parallel;
mod registry;
mod results;
pub mod runner;
pub mod step;
pub mod timing;

pub use cancel::CancellationFlag;
pub use error::{Abandoned, RegistryError, RunnerError, StepError};
pub use outcome::Outcome;
pub use parallel::Completion;
pub use registry::{ParallelTask, ParallelTasks};
pub use results::ParallelResults;
pub use runner::{Runner, RunnerBuilder, run_parallel, run_sequential};
pub use step::{Next, Sequence, StepTask};
pub use timing::Timeout;
