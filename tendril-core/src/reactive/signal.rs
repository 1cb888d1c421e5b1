//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and is
//! the unit the store tracks subscriptions against.
//!
//! # How Signals Work
//!
//! 1. When a signal is read with a [`Tracker`], the read is recorded and
//!    the running watcher ends up subscribed to the signal.
//!
//! 2. When a signal's value changes, the store queues every subscriber.
//!
//! 3. Plain [`Signal::get`] reads never subscribe anything.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A unique ID (8 bytes)
//! - The value, behind a `RefCell`
//! - A weak link to the owning store (subscriber sets live in the store)

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use super::context::Tracker;
use super::store::{Store, StoreInner};
use super::subscriber::SignalId;

struct SignalInner<T> {
    id: SignalId,
    value: RefCell<T>,
    store: Weak<StoreInner>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            Store::from_inner(store).clear_subscribers(self.id);
        }
    }
}

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust,ignore
/// let store = Store::new();
/// let count = store.create_signal(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: Clone + 'static> Signal<T> {
    /// Create a new signal owned by `store`.
    pub fn new(store: &Store, value: T) -> Self {
        let id = SignalId::new();
        tracing::trace!(%id, "signal created");
        Self {
            inner: Rc::new(SignalInner {
                id,
                value: RefCell::new(value),
                store: store.downgrade(),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SignalId {
        self.inner.id
    }

    /// Get the current value without tracking.
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Get the current value and record the read on `tracker`.
    pub fn track(&self, tracker: &Tracker) -> T {
        tracker.record(self.inner.id);
        self.get()
    }

    /// Borrow the current value without cloning or tracking.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Set a new value and notify subscribers.
    pub fn set(&self, value: T) {
        let previous = self.inner.value.replace(value);
        // Dropped before notifying; its destructor must not observe a borrow.
        drop(previous);
        self.notify();
    }

    /// Update the value using a function of the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = self.with(f);
        self.set(next);
    }

    fn notify(&self) {
        if let Some(store) = self.inner.store.upgrade() {
            Store::from_inner(store).notify(self.inner.id);
        }
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .store
            .upgrade()
            .map_or(0, |store| Store::from_inner(store).subscriber_count(self.inner.id))
    }

    /// Clear the subscriber set. Watchers that read the signal again will
    /// resubscribe on their next run.
    pub fn dispose(&self) {
        if let Some(store) = self.inner.store.upgrade() {
            Store::from_inner(store).clear_subscribers(self.inner.id);
        }
        tracing::trace!(id = %self.inner.id, "signal disposed");
    }

    /// Check whether two handles point to the same signal.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
