//! Signal Store
//!
//! The store is the central coordinator that connects signals and watchers.
//! It owns every subscriber set and schedules recomputation when signals
//! change.
//!
//! # How It Works
//!
//! 1. A watcher runs its computation inside [`Store::track`]-style scope;
//!    every tracked read lands on the [`Tracker`].
//!
//! 2. When the computation completes, the watcher's previous dependency set
//!    is swapped for the new one: stale subscriptions are removed before the
//!    new ones are added.
//!
//! 3. When a signal is written, its subscribers are queued. The queue is
//!    drained immediately unless a batch, a tracked computation or another
//!    flush is in progress, in which case the outermost span drains it.
//!    A watcher queued several times before the drain runs once.
//!
//! # Threading
//!
//! The store is single-threaded. All state lives behind `RefCell`/`Cell`
//! and no borrow is held while user code runs, so callbacks may freely
//! read, write and create watchers.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use smallvec::SmallVec;
use thiserror::Error;

use super::context::{Dependencies, FlagGuard, Tracker};
use super::subscriber::{SignalId, WatcherId};
use super::watcher::Watcher;
use super::Signal;
use crate::config::SignalConfig;

/// Errors raised by the signal store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// `track` was entered while another tracked computation was running.
    #[error("tracking is not re-entrant: a tracked computation is already running")]
    ReentrantTracking,
}

type Recompute = Rc<dyn Fn(&Store, WatcherId) -> Result<(), StoreError>>;

struct WatcherEntry {
    recompute: Recompute,
    dependencies: Dependencies,
    runs: usize,
}

pub(crate) struct StoreInner {
    max_flush_iterations: usize,
    /// Signal ID -> watchers subscribed to it.
    subscribers: RefCell<HashMap<SignalId, IndexSet<WatcherId>>>,
    watchers: RefCell<HashMap<WatcherId, WatcherEntry>>,
    /// Watchers queued for recomputation, in notification order.
    pending: RefCell<IndexSet<WatcherId>>,
    /// Watchers currently executing, innermost last.
    running: RefCell<SmallVec<[WatcherId; 4]>>,
    batch_depth: Cell<usize>,
    tracking: Cell<bool>,
    flushing: Cell<bool>,
}

/// Handle to a signal store. Clones share the same store.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    /// Create a store with default settings.
    pub fn new() -> Self {
        Self::with_config(&SignalConfig::default())
    }

    pub fn with_config(config: &SignalConfig) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                max_flush_iterations: config.max_flush_iterations.max(1),
                subscribers: RefCell::new(HashMap::new()),
                watchers: RefCell::new(HashMap::new()),
                pending: RefCell::new(IndexSet::new()),
                running: RefCell::new(SmallVec::new()),
                batch_depth: Cell::new(0),
                tracking: Cell::new(false),
                flushing: Cell::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<StoreInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<StoreInner> {
        Rc::downgrade(&self.inner)
    }

    /// Create a signal owned by this store.
    pub fn create_signal<T: Clone + 'static>(&self, initial: T) -> Signal<T> {
        Signal::new(self, initial)
    }

    /// Run `body` with a fresh tracker and return its result together with
    /// the set of signals it read.
    ///
    /// Writes performed by `body` are held back and delivered once it
    /// returns. Fails if another tracked computation is already running.
    pub fn track<R>(
        &self,
        body: impl FnOnce(&Tracker) -> R,
    ) -> Result<(R, Dependencies), StoreError> {
        let result = self.track_with(None, body);
        self.flush_if_idle();
        result
    }

    fn track_with<R>(
        &self,
        watcher: Option<WatcherId>,
        body: impl FnOnce(&Tracker) -> R,
    ) -> Result<(R, Dependencies), StoreError> {
        let guard = FlagGuard::raise(&self.inner.tracking).ok_or(StoreError::ReentrantTracking)?;
        let tracker = Tracker::new(watcher);
        let value = body(&tracker);
        drop(guard);
        Ok((value, tracker.finish()))
    }

    /// Create a watcher and run it once.
    ///
    /// `compute` runs tracked; its dependency set is replaced on every run.
    /// `apply` receives the result outside the tracking scope, so it may
    /// create further watchers or write signals.
    pub fn watch<R, C, A>(&self, compute: C, apply: A) -> Result<Watcher, StoreError>
    where
        R: 'static,
        C: Fn(&Tracker) -> R + 'static,
        A: Fn(R) + 'static,
    {
        if self.inner.tracking.get() {
            return Err(StoreError::ReentrantTracking);
        }

        let id = WatcherId::new();
        let recompute: Recompute = Rc::new(move |store: &Store, id: WatcherId| {
            let (value, dependencies) = store.track_with(Some(id), &compute)?;
            store.replace_dependencies(id, dependencies);
            apply(value);
            Ok(())
        });

        self.inner.watchers.borrow_mut().insert(
            id,
            WatcherEntry {
                recompute,
                dependencies: Dependencies::default(),
                runs: 0,
            },
        );
        tracing::debug!(%id, "watcher created");

        let watcher = Watcher::new(id, self.downgrade());
        self.run_watcher(id)?;
        self.flush_if_idle();
        Ok(watcher)
    }

    /// Run `f`, delivering all notifications it causes once it returns.
    ///
    /// A watcher affected by several writes inside the batch recomputes once
    /// and sees the final value of every written signal.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let depth = DepthGuard::enter(&self.inner.batch_depth);
        let result = f();
        drop(depth);
        self.flush_if_idle();
        result
    }

    /// Check if a tracked computation is running.
    pub fn is_tracking(&self) -> bool {
        self.inner.tracking.get()
    }

    pub fn is_batching(&self) -> bool {
        self.inner.batch_depth.get() > 0
    }

    /// Number of watchers subscribed to `signal`.
    pub fn subscriber_count(&self, signal: SignalId) -> usize {
        self.inner
            .subscribers
            .borrow()
            .get(&signal)
            .map_or(0, IndexSet::len)
    }

    /// Number of live watchers.
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.borrow().len()
    }

    pub(crate) fn watcher_runs(&self, id: WatcherId) -> usize {
        self.inner.watchers.borrow().get(&id).map_or(0, |e| e.runs)
    }

    pub(crate) fn watcher_dependencies(&self, id: WatcherId) -> Dependencies {
        self.inner
            .watchers
            .borrow()
            .get(&id)
            .map(|e| e.dependencies.clone())
            .unwrap_or_default()
    }

    /// Queue every subscriber of `signal` and drain the queue if no span is
    /// open.
    pub(crate) fn notify(&self, signal: SignalId) {
        let current = self.inner.running.borrow().last().copied();
        {
            let subscribers = self.inner.subscribers.borrow();
            if let Some(set) = subscribers.get(&signal) {
                let mut pending = self.inner.pending.borrow_mut();
                // A running watcher never re-queues itself.
                pending.extend(set.iter().copied().filter(|id| Some(*id) != current));
            }
        }
        tracing::trace!(%signal, "signal changed");
        self.flush_if_idle();
    }

    /// Drop every subscription to `signal`.
    pub(crate) fn clear_subscribers(&self, signal: SignalId) {
        self.inner.subscribers.borrow_mut().remove(&signal);
    }

    /// Re-run a watcher now, outside the notification queue.
    pub(crate) fn rerun(&self, id: WatcherId) -> Result<(), StoreError> {
        if self.inner.tracking.get() {
            return Err(StoreError::ReentrantTracking);
        }
        self.run_watcher(id)?;
        self.flush_if_idle();
        Ok(())
    }

    /// Remove a watcher from the store and from every subscriber set.
    pub(crate) fn dispose_watcher(&self, id: WatcherId) {
        let entry = self.inner.watchers.borrow_mut().remove(&id);
        let Some(entry) = entry else { return };

        {
            let mut subscribers = self.inner.subscribers.borrow_mut();
            for signal in entry.dependencies.iter() {
                if let Some(set) = subscribers.get_mut(&signal) {
                    set.shift_remove(&id);
                    if set.is_empty() {
                        subscribers.remove(&signal);
                    }
                }
            }
        }
        self.inner.pending.borrow_mut().shift_remove(&id);
        tracing::debug!(%id, "watcher disposed");

        // The closure may own signals whose drop touches the store again.
        drop(entry);
    }

    fn replace_dependencies(&self, id: WatcherId, next: Dependencies) {
        let previous = {
            let mut watchers = self.inner.watchers.borrow_mut();
            match watchers.get_mut(&id) {
                Some(entry) => {
                    entry.runs += 1;
                    std::mem::replace(&mut entry.dependencies, next.clone())
                }
                // Disposed during its own computation.
                None => return,
            }
        };

        let mut subscribers = self.inner.subscribers.borrow_mut();
        for signal in previous.iter().filter(|s| !next.contains(*s)) {
            if let Some(set) = subscribers.get_mut(&signal) {
                set.shift_remove(&id);
                if set.is_empty() {
                    subscribers.remove(&signal);
                }
            }
        }
        for signal in next.iter() {
            subscribers.entry(signal).or_default().insert(id);
        }
    }

    fn run_watcher(&self, id: WatcherId) -> Result<(), StoreError> {
        let recompute = match self.inner.watchers.borrow().get(&id) {
            Some(entry) => Rc::clone(&entry.recompute),
            None => return Ok(()),
        };

        self.inner.running.borrow_mut().push(id);
        let result = recompute(self, id);
        self.inner.running.borrow_mut().pop();
        result
    }

    fn flush_if_idle(&self) {
        if self.inner.batch_depth.get() == 0
            && !self.inner.tracking.get()
            && !self.inner.flushing.get()
        {
            self.flush();
        }
    }

    fn flush(&self) {
        let Some(_flushing) = FlagGuard::raise(&self.inner.flushing) else {
            return;
        };

        let mut iterations = 0usize;
        loop {
            let next = self.inner.pending.borrow_mut().shift_remove_index(0);
            let Some(id) = next else { break };

            iterations += 1;
            if iterations > self.inner.max_flush_iterations {
                let dropped = {
                    let mut pending = self.inner.pending.borrow_mut();
                    let dropped = pending.len() + 1;
                    pending.clear();
                    dropped
                };
                tracing::error!(
                    limit = self.inner.max_flush_iterations,
                    dropped,
                    "watcher notifications did not settle; dropping queued recomputations"
                );
                break;
            }

            if let Err(err) = self.run_watcher(id) {
                tracing::error!(%id, %err, "watcher recomputation failed");
            }
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("watchers", &self.watcher_count())
            .field("pending", &self.inner.pending.borrow().len())
            .field("tracking", &self.inner.tracking.get())
            .finish()
    }
}

/// Increments a depth counter for the guard's lifetime.
struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
}

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self { depth }
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_collects_reads() {
        let store = Store::new();
        let a = store.create_signal(1);
        let b = store.create_signal(2);
        let untouched = store.create_signal(3);

        let (sum, deps) = store
            .track(|t| a.track(t) + b.track(t) + a.track(t))
            .unwrap();

        assert_eq!(sum, 4);
        assert_eq!(deps.len(), 2);
        assert!(deps.contains(a.id()));
        assert!(deps.contains(b.id()));
        assert!(!deps.contains(untouched.id()));
    }

    #[test]
    fn nested_track_is_rejected() {
        let store = Store::new();
        let inner = store.track(|_| store.track(|_| ())).unwrap().0;
        assert_eq!(inner, Err(StoreError::ReentrantTracking));

        // The outer scope released the flag.
        assert!(!store.is_tracking());
        assert!(store.track(|_| ()).is_ok());
    }

    #[test]
    fn watch_inside_track_is_rejected() {
        let store = Store::new();
        let (result, _) = store.track(|_| store.watch(|_| (), |_| ())).unwrap();
        assert!(matches!(result, Err(StoreError::ReentrantTracking)));
        assert_eq!(store.watcher_count(), 0);
    }

    #[test]
    fn batch_coalesces_notifications() {
        let store = Store::new();
        let a = store.create_signal(1);
        let b = store.create_signal(10);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (a2, b2, seen2) = (a.clone(), b.clone(), seen.clone());
        let _watcher = store
            .watch(
                move |t| a2.track(t) + b2.track(t),
                move |sum| seen2.borrow_mut().push(sum),
            )
            .unwrap();

        store.batch(|| {
            a.set(2);
            b.set(20);
            a.set(3);
        });

        // Initial run plus exactly one recomputation with the final values
        assert_eq!(*seen.borrow(), vec![11, 23]);
    }

    #[test]
    fn nested_batches_flush_at_outermost() {
        let store = Store::new();
        let a = store.create_signal(0);
        let runs = Rc::new(Cell::new(0));

        let (a2, runs2) = (a.clone(), runs.clone());
        let _watcher = store
            .watch(move |t| a2.track(t), move |_| runs2.set(runs2.get() + 1))
            .unwrap();

        store.batch(|| {
            a.set(1);
            store.batch(|| a.set(2));
            // Inner batch closed but the outer one is still open
            assert_eq!(runs.get(), 1);
        });
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn self_write_does_not_recurse() {
        let store = Store::new();
        let count = store.create_signal(0);
        let runs = Rc::new(Cell::new(0));

        let (count2, runs2) = (count.clone(), runs.clone());
        let watcher = store
            .watch(
                move |t| {
                    let value = count2.track(t);
                    count2.set(value + 1);
                },
                move |_| runs2.set(runs2.get() + 1),
            )
            .unwrap();

        assert_eq!(runs.get(), 1);
        assert_eq!(count.get(), 1);
        assert_eq!(watcher.run_count(), 1);
    }

    #[test]
    fn mutual_recursion_is_capped() {
        let store = Store::with_config(&SignalConfig {
            max_flush_iterations: 50,
        });
        let a = store.create_signal(0);
        let b = store.create_signal(0);

        let (a1, b1) = (a.clone(), b.clone());
        let _w1 = store
            .watch(move |t| a1.track(t), move |v| b1.set(v + 1))
            .unwrap();
        let (a2, b2) = (a.clone(), b.clone());
        let _w2 = store
            .watch(move |t| b2.track(t), move |v| a2.set(v + 1))
            .unwrap();

        // Terminates instead of looping forever
        a.set(100);
        assert!(a.get() > 100);
    }

    #[test]
    fn disposed_watcher_leaves_subscriber_sets() {
        let store = Store::new();
        let a = store.create_signal(0);

        let a2 = a.clone();
        let watcher = store.watch(move |t| a2.track(t), |_| ()).unwrap();
        assert_eq!(store.subscriber_count(a.id()), 1);

        watcher.dispose();
        assert_eq!(store.subscriber_count(a.id()), 0);
        assert_eq!(store.watcher_count(), 0);
    }
}
