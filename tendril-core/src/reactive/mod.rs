//! Reactive Primitives
//!
//! This module implements the signal store: signals, watchers, and the
//! tracking context that connects them. Everything the directive engine
//! re-evaluates is driven from here.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal is read with a
//! [`Tracker`], the read is recorded; when the computation finishes, the
//! owning watcher is subscribed to exactly the signals it read.
//!
//! ## Watchers
//!
//! A Watcher is a tracked computation plus an application step. It runs
//! once on creation and again whenever a dependency changes.
//!
//! ## Batching
//!
//! Writes inside [`Store::batch`], inside a tracked computation, or while
//! notifications are already being delivered are coalesced: each affected
//! watcher recomputes once, after the span closes.
//!
//! # Implementation Notes
//!
//! There is no ambient "current computation". The tracker is handed to the
//! computation explicitly and tracking is not re-entrant: a second
//! [`Store::track`] while one is running fails with
//! [`StoreError::ReentrantTracking`].

mod context;
mod signal;
mod store;
mod subscriber;
mod watcher;

pub use context::{Dependencies, Tracker};
pub use signal::Signal;
pub use store::{Store, StoreError};
pub use subscriber::{SignalId, WatcherId};
pub use watcher::Watcher;
