//! The immutable outcome of a parallel run.
use std::collections::HashMap;

/// Snapshot of what every task of a parallel run reported before the run
/// finalized.
///
/// For each identifier at most one of result or error is present. A task that
/// had not reported when the run finalized (because the timeout fired or a
/// stop-on-failure task failed first) has neither; it still shows up in
/// [`identifiers`](Self::identifiers).
///
/// Handed to the caller by value and never touched by the runner again, so it
/// can be shared across threads freely when `T` and `E` allow it.
#[derive(Debug)]
pub struct ParallelResults<T, E> {
    identifiers: Vec<String>,
    results: HashMap<String, T>,
    errors: HashMap<String, E>,
    timed_out: bool,
}

impl<T, E> ParallelResults<T, E> {
    pub(crate) fn new(
        identifiers: Vec<String>,
        results: HashMap<String, T>,
        errors: HashMap<String, E>,
        timed_out: bool,
    ) -> Self {
        Self {
            identifiers,
            results,
            errors,
            timed_out,
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Vec::new(), HashMap::new(), HashMap::new(), false)
    }

    /// Identifiers the run was started with, in registration order.
    #[must_use]
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// Result of the task under `identifier`, if it succeeded before the run
    /// finalized.
    #[must_use]
    pub fn result_for_identifier(&self, identifier: &str) -> Option<&T> {
        self.results.get(identifier)
    }

    /// Every task that reported a failure, keyed by identifier.
    #[must_use]
    pub fn errors(&self) -> &HashMap<String, E> {
        &self.errors
    }

    /// Error of the task under `identifier`, if it failed before the run finalized.
    #[must_use]
    pub fn error_for_identifier(&self, identifier: &str) -> Option<&E> {
        self.errors.get(identifier)
    }

    /// `true` if the run's timeout fired before every task reported.
    #[must_use]
    pub fn has_timed_out(&self) -> bool {
        self.timed_out
    }

    /// Identifiers that neither succeeded nor failed before finalization.
    pub fn unfinished(&self) -> impl Iterator<Item = &str> {
        self.identifiers
            .iter()
            .filter(|id| !self.results.contains_key(*id) && !self.errors.contains_key(*id))
            .map(String::as_str)
    }

    /// Consumes the snapshot, returning the successful results.
    #[must_use]
    pub fn into_results(self) -> HashMap<String, T> {
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfinished_lists_tasks_without_outcome() {
        let results = ParallelResults::new(
            vec!["a".into(), "b".into(), "c".into()],
            HashMap::from([("a".to_string(), 1)]),
            HashMap::from([("c".to_string(), "boom")]),
            true,
        );

        assert!(results.has_timed_out());
        assert_eq!(results.result_for_identifier("a"), Some(&1));
        assert_eq!(results.result_for_identifier("c"), None);
        assert_eq!(results.error_for_identifier("c"), Some(&"boom"));
        assert_eq!(results.unfinished().collect::<Vec<_>>(), ["b"]);
    }

    #[test]
    fn empty_snapshot() {
        let results = ParallelResults::<(), ()>::empty();
        assert!(results.identifiers().is_empty());
        assert!(results.errors().is_empty());
        assert!(!results.has_timed_out());
    }
}
