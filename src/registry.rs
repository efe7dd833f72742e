//! The identifier-keyed collection of tasks fed to a parallel run.
use std::{collections::HashMap, fmt};

use crate::{Completion, RegistryError};

/// A unit of work for a parallel run.
///
/// It receives a [`Completion`] and must report through it exactly once,
/// either right away or later from any thread.
pub type ParallelTask<T, E> = Box<dyn FnOnce(Completion<T, E>) + Send + 'static>;

pub(crate) struct Entry<T, E> {
    pub(crate) task: ParallelTask<T, E>,
    pub(crate) stop_on_failure: bool,
}

/// Tasks to run concurrently, keyed by identifier.
///
/// Registering a task under an identifier that is already present replaces
/// the earlier task and its policy, but keeps the identifier's original
/// position in [`identifiers`](Self::identifiers).
///
/// The registry is built up front and consumed by
/// [`Runner::run_parallel`](crate::Runner::run_parallel).
///
/// # Example
/// ```
/// # use asyncstep::ParallelTasks;
/// let mut tasks = ParallelTasks::<u32, String>::new();
/// tasks
///     .add_task("fetch", |done| done.ok(1))
///     .add_task_stop_on_failure("critical", |done| done.ok(2), true);
///
/// assert_eq!(tasks.identifiers(), ["fetch", "critical"]);
/// ```
pub struct ParallelTasks<T, E> {
    entries: HashMap<String, Entry<T, E>>,
    order: Vec<String>,
}

impl<T, E> ParallelTasks<T, E> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::with_capacity(8),
            order: Vec::with_capacity(8),
        }
    }

    /// Registers `task` under `identifier`. Its failure is recorded but does
    /// not stop the run.
    pub fn add_task(
        &mut self,
        identifier: impl Into<String>,
        task: impl FnOnce(Completion<T, E>) + Send + 'static,
    ) -> &mut Self {
        self.add_task_stop_on_failure(identifier, task, false)
    }

    /// Registers `task` under `identifier` with an explicit policy.
    ///
    /// When `stop_on_failure` is `true`, a failure of this task finalizes the
    /// whole run immediately with whatever has been recorded so far.
    pub fn add_task_stop_on_failure(
        &mut self,
        identifier: impl Into<String>,
        task: impl FnOnce(Completion<T, E>) + Send + 'static,
        stop_on_failure: bool,
    ) -> &mut Self {
        let identifier = identifier.into();
        let entry = Entry {
            task: Box::new(task),
            stop_on_failure,
        };
        if self.entries.insert(identifier.clone(), entry).is_none() {
            self.order.push(identifier);
        }
        self
    }

    /// Identifiers currently registered, in first-registration order.
    #[must_use]
    pub fn identifiers(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Returns the task registered under `identifier`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownIdentifier`] if nothing is registered under it.
    pub fn task_for_identifier(&self, identifier: &str) -> Result<&ParallelTask<T, E>, RegistryError> {
        self.entries
            .get(identifier)
            .map(|entry| &entry.task)
            .ok_or_else(|| RegistryError::UnknownIdentifier(identifier.to_owned()))
    }

    /// Returns whether a failure of the task under `identifier` stops the run.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownIdentifier`] if nothing is registered under it.
    pub fn stops_on_failure(&self, identifier: &str) -> Result<bool, RegistryError> {
        self.entries
            .get(identifier)
            .map(|entry| entry.stop_on_failure)
            .ok_or_else(|| RegistryError::UnknownIdentifier(identifier.to_owned()))
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if no task is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    // Drains the registry in identifier order for a run.
    pub(crate) fn into_entries(mut self) -> Vec<(String, Entry<T, E>)> {
        self.order
            .into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|entry| (id, entry)))
            .collect()
    }
}

impl<T, E> Default for ParallelTasks<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for ParallelTasks<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for id in &self.order {
            if let Some(entry) = self.entries.get(id) {
                map.entry(id, &format_args!("stop_on_failure: {}", entry.stop_on_failure));
            }
        }
        map.finish()
    }
}
