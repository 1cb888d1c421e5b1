//! Watcher Handle
//!
//! A watcher is a unit of deferred work: a tracked computation plus an
//! untracked application step, re-run whenever a signal it read changes.
//!
//! # How Watchers Work
//!
//! 1. When created through [`Store::watch`](super::Store::watch), the
//!    watcher runs immediately to establish its initial dependencies.
//!
//! 2. When any dependency changes, the store queues it for recomputation.
//!
//! 3. Each run replaces the dependency set with exactly the signals read
//!    during that run.
//!
//! # Cleanup
//!
//! Dropping the handle disposes the watcher: it leaves every subscriber set
//! and will not run again.

use std::cell::Cell;
use std::fmt;
use std::rc::Weak;

use super::context::Dependencies;
use super::store::{Store, StoreError, StoreInner};
use super::subscriber::WatcherId;

/// Owning handle to a watcher registered in a [`Store`].
pub struct Watcher {
    id: WatcherId,
    store: Weak<StoreInner>,
    disposed: Cell<bool>,
}

impl Watcher {
    pub(crate) fn new(id: WatcherId, store: Weak<StoreInner>) -> Self {
        Self {
            id,
            store,
            disposed: Cell::new(false),
        }
    }

    pub fn id(&self) -> WatcherId {
        self.id
    }

    fn store(&self) -> Option<Store> {
        if self.disposed.get() {
            return None;
        }
        self.store.upgrade().map(Store::from_inner)
    }

    /// Number of completed runs, including the initial one.
    pub fn run_count(&self) -> usize {
        self.store().map_or(0, |store| store.watcher_runs(self.id))
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies().len()
    }

    /// Signals read during the most recent run.
    pub fn dependencies(&self) -> Dependencies {
        self.store()
            .map(|store| store.watcher_dependencies(self.id))
            .unwrap_or_default()
    }

    /// Re-run the watcher immediately.
    pub fn rerun(&self) -> Result<(), StoreError> {
        match self.store() {
            Some(store) => store.rerun(self.id),
            None => Ok(()),
        }
    }

    /// Dispose of the watcher.
    ///
    /// After disposal the watcher holds no subscriptions and never runs.
    pub fn dispose(&self) {
        if let Some(store) = self.store() {
            store.dispose_watcher(self.id);
        }
        self.disposed.set(true);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn watcher_runs_on_creation() {
        let store = Store::new();
        let run_count = Rc::new(Cell::new(0));
        let run_count_clone = run_count.clone();

        let watcher = store
            .watch(|_| (), move |_| run_count_clone.set(run_count_clone.get() + 1))
            .unwrap();

        // Watcher should have run once on creation
        assert_eq!(run_count.get(), 1);
        assert_eq!(watcher.run_count(), 1);
    }

    #[test]
    fn watcher_reruns_on_dependency_change() {
        let store = Store::new();
        let signal = store.create_signal(1);
        let observed = Rc::new(Cell::new(0));

        let (signal_clone, observed_clone) = (signal.clone(), observed.clone());
        let watcher = store
            .watch(move |t| signal_clone.track(t), move |v| observed_clone.set(v))
            .unwrap();
        assert_eq!(observed.get(), 1);

        signal.set(7);
        assert_eq!(observed.get(), 7);
        assert_eq!(watcher.run_count(), 2);
    }

    #[test]
    fn dependencies_are_replaced_not_merged() {
        let store = Store::new();
        let use_left = store.create_signal(true);
        let left = store.create_signal("left");
        let right = store.create_signal("right");
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (flag, l, r, seen2) = (use_left.clone(), left.clone(), right.clone(), seen.clone());
        let watcher = store
            .watch(
                move |t| if flag.track(t) { l.track(t) } else { r.track(t) },
                move |v| seen2.borrow_mut().push(v),
            )
            .unwrap();

        assert_eq!(watcher.dependency_count(), 2);
        assert_eq!(left.subscriber_count(), 1);
        assert_eq!(right.subscriber_count(), 0);

        use_left.set(false);
        assert_eq!(watcher.dependency_count(), 2);
        assert_eq!(left.subscriber_count(), 0);
        assert_eq!(right.subscriber_count(), 1);

        // A write to the stale dependency must not trigger a run
        left.set("ignored");
        assert_eq!(*seen.borrow(), vec!["left", "right"]);
    }

    #[test]
    fn watcher_does_not_run_after_disposal() {
        let store = Store::new();
        let signal = store.create_signal(0);
        let run_count = Rc::new(Cell::new(0));

        let (signal_clone, run_clone) = (signal.clone(), run_count.clone());
        let watcher = store
            .watch(
                move |t| signal_clone.track(t),
                move |_| run_clone.set(run_clone.get() + 1),
            )
            .unwrap();

        watcher.dispose();
        assert!(watcher.is_disposed());

        signal.set(1);
        signal.set(2);
        assert!(watcher.rerun().is_ok());
        assert_eq!(run_count.get(), 1);
    }

    #[test]
    fn dropping_handle_disposes() {
        let store = Store::new();
        let signal = store.create_signal(0);

        let signal_clone = signal.clone();
        let watcher = store.watch(move |t| signal_clone.track(t), |_| ()).unwrap();
        assert_eq!(signal.subscriber_count(), 1);

        drop(watcher);
        assert_eq!(signal.subscriber_count(), 0);
    }
}
