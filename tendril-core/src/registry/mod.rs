//! Module Registry
//!
//! Modules are named, lazily-initialized bundles of capabilities. A module
//! is registered with an async factory; the first resolve runs the factory
//! and every later or concurrent resolve shares its result.
//!
//! # Concepts
//!
//! ## Capabilities
//!
//! A factory returns [`Capabilities`], which the registry merges into one
//! namespace keyed by capability name. Consumers look capabilities up by
//! name instead of through ambient globals.
//!
//! ## Waiting
//!
//! [`ResolveOptions::wait`] awaits full resolution.
//! [`ResolveOptions::background`] only starts it: the factory runs to its
//! first suspension point and [`Registry::settle`] finishes the rest.
//!
//! ## Cycles
//!
//! Factories resolve their own dependencies through [`ModuleContext`].
//! Those waits form a graph; a wait that would close a cycle fails with
//! [`RegistryError::CircularResolution`].

mod capability;
mod context;
mod graph;
mod modules;
mod resolution;

pub use capability::{Capabilities, Capability};
pub use context::ModuleContext;
pub use modules::{FactoryError, ModuleState, Registry, RegistryError};
pub use resolution::{IntoModuleNames, ModuleSlot, PendingModule, ResolveOptions, Resolution};
