//! Resolve requests and their results.

use std::fmt;
use std::rc::Rc;

use futures_util::future::join_all;
use futures_util::FutureExt;
use indexmap::IndexMap;

use super::capability::{Capabilities, Capability};
use super::modules::{RegistryError, SharedResolution};

/// Options for [`Registry::resolve`](super::Registry::resolve).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Await full resolution of every requested module before returning.
    ///
    /// When `false`, each factory is started and runs to its first
    /// suspension point; modules that have not finished are returned as
    /// [`ModuleSlot::Pending`] and are completed by
    /// [`Registry::settle`](super::Registry::settle).
    pub wait_on_init: bool,
}

impl ResolveOptions {
    pub fn wait() -> Self {
        Self { wait_on_init: true }
    }

    pub fn background() -> Self {
        Self {
            wait_on_init: false,
        }
    }
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self::wait()
    }
}

/// Anything that names one or more modules, in request order.
pub trait IntoModuleNames {
    fn into_module_names(self) -> Vec<String>;
}

impl IntoModuleNames for &str {
    fn into_module_names(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoModuleNames for String {
    fn into_module_names(self) -> Vec<String> {
        vec![self]
    }
}

impl<T: AsRef<str>> IntoModuleNames for &[T] {
    fn into_module_names(self) -> Vec<String> {
        self.iter().map(|name| name.as_ref().to_string()).collect()
    }
}

impl<T: AsRef<str>, const N: usize> IntoModuleNames for [T; N] {
    fn into_module_names(self) -> Vec<String> {
        self.iter().map(|name| name.as_ref().to_string()).collect()
    }
}

impl<T: AsRef<str>> IntoModuleNames for Vec<T> {
    fn into_module_names(self) -> Vec<String> {
        self.iter().map(|name| name.as_ref().to_string()).collect()
    }
}

/// A module resolution that was started but has not finished.
#[derive(Clone)]
pub struct PendingModule {
    name: Rc<str>,
    future: SharedResolution,
}

impl PendingModule {
    pub(crate) fn new(name: &str, future: SharedResolution) -> Self {
        Self {
            name: name.into(),
            future,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the module to finish resolving.
    ///
    /// Every waiter observes the same result.
    pub async fn wait(&self) -> Result<Rc<Capabilities>, RegistryError> {
        self.future.clone().await
    }

    /// The result, if the module has already finished.
    pub fn peek(&self) -> Option<Result<Rc<Capabilities>, RegistryError>> {
        self.future.peek().cloned()
    }
}

impl fmt::Debug for PendingModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PendingModule").field(&self.name).finish()
    }
}

/// Result slot for one requested module.
#[derive(Clone, Debug)]
pub enum ModuleSlot {
    Ready(Rc<Capabilities>),
    Pending(PendingModule),
}

impl ModuleSlot {
    pub fn is_ready(&self) -> bool {
        match self {
            ModuleSlot::Ready(_) => true,
            ModuleSlot::Pending(pending) => matches!(pending.peek(), Some(Ok(_))),
        }
    }

    /// Capabilities, if the module has resolved.
    pub fn capabilities(&self) -> Option<Rc<Capabilities>> {
        match self {
            ModuleSlot::Ready(caps) => Some(Rc::clone(caps)),
            ModuleSlot::Pending(pending) => pending.peek().and_then(Result::ok),
        }
    }

    pub async fn wait(&self) -> Result<Rc<Capabilities>, RegistryError> {
        match self {
            ModuleSlot::Ready(caps) => Ok(Rc::clone(caps)),
            ModuleSlot::Pending(pending) => pending.wait().await,
        }
    }
}

/// Requested module names mapped to their slots, in request order.
#[derive(Clone, Debug, Default)]
pub struct Resolution {
    slots: IndexMap<String, ModuleSlot>,
}

impl Resolution {
    pub(crate) fn insert(&mut self, name: String, slot: ModuleSlot) {
        self.slots.insert(name, slot);
    }

    pub fn get(&self, module: &str) -> Option<&ModuleSlot> {
        self.slots.get(module)
    }

    /// Capabilities of `module`, if it has resolved.
    pub fn capabilities(&self, module: &str) -> Option<Rc<Capabilities>> {
        self.get(module)?.capabilities()
    }

    /// A single capability of a resolved module, downcast to `T`.
    pub fn capability_as<T: 'static>(&self, module: &str, capability: &str) -> Option<Rc<T>> {
        self.capabilities(module)?.get_as::<T>(capability)
    }

    pub fn capability(&self, module: &str, capability: &str) -> Option<Capability> {
        self.capabilities(module)?.get(capability)
    }

    /// Whether every requested module has resolved.
    pub fn is_ready(&self) -> bool {
        self.slots.values().all(ModuleSlot::is_ready)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Wait for every pending slot, turning this into a fully ready
    /// resolution or the first failure in request order.
    pub async fn wait(self) -> Result<Resolution, RegistryError> {
        let names: Vec<String> = self.slots.keys().cloned().collect();
        let results = join_all(self.slots.values().map(|slot| slot.wait().boxed_local())).await;

        let mut ready = Resolution::default();
        for (name, result) in names.into_iter().zip(results) {
            ready.insert(name, ModuleSlot::Ready(result?));
        }
        Ok(ready)
    }
}
