//! Tracking Context
//!
//! A [`Tracker`] is the explicit replacement for an ambient "currently
//! running computation". The store hands one to the body passed to
//! [`Store::track`](super::Store::track); every tracked signal read records
//! itself on it, and the collected set is returned when the body completes.
//!
//! # Implementation
//!
//! Reads are collected in an insertion-ordered set, so reading the same
//! signal twice inside one computation records it once.

use std::cell::{Cell, RefCell};

use indexmap::IndexSet;

use super::subscriber::{SignalId, WatcherId};

/// Collects the signals read during one tracked computation.
#[derive(Debug)]
pub struct Tracker {
    /// The watcher this computation belongs to, if any.
    watcher: Option<WatcherId>,
    /// Signal IDs read so far.
    reads: RefCell<IndexSet<SignalId>>,
}

impl Tracker {
    pub(crate) fn new(watcher: Option<WatcherId>) -> Self {
        Self {
            watcher,
            reads: RefCell::new(IndexSet::new()),
        }
    }

    /// Record a read of the given signal.
    pub fn record(&self, signal: SignalId) {
        if self.reads.borrow_mut().insert(signal) {
            tracing::trace!(%signal, "dependency recorded");
        }
    }

    /// The watcher being recomputed, if this is a watcher run.
    pub fn watcher(&self) -> Option<WatcherId> {
        self.watcher
    }

    /// Number of distinct signals read so far.
    pub fn len(&self) -> usize {
        self.reads.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.borrow().is_empty()
    }

    pub(crate) fn finish(self) -> Dependencies {
        Dependencies(self.reads.into_inner())
    }
}

/// The set of signals a computation read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies(IndexSet<SignalId>);

impl Dependencies {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, signal: SignalId) -> bool {
        self.0.contains(&signal)
    }

    pub fn iter(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<SignalId> for Dependencies {
    fn from_iter<I: IntoIterator<Item = SignalId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Guard that clears a flag when dropped.
///
/// Keeps the store's tracking/flushing flags consistent even if the guarded
/// computation panics.
pub(crate) struct FlagGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> FlagGuard<'a> {
    /// Raise `flag`, or return `None` if it is already raised.
    pub(crate) fn raise(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self { flag })
        }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}
