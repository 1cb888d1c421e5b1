//! Context handed to module factories.

use std::rc::Rc;

use super::capability::Capability;
use super::modules::{Registry, RegistryError};
use super::resolution::{IntoModuleNames, ResolveOptions, Resolution};
use crate::dom::Node;
use crate::reactive::Store;

/// What a module factory can reach while it initializes.
///
/// Resolving through the context attributes the wait to this module, which
/// is what lets the registry detect circular resolution.
#[derive(Clone)]
pub struct ModuleContext {
    registry: Registry,
    module: Rc<str>,
}

impl ModuleContext {
    pub(crate) fn new(registry: Registry, module: &str) -> Self {
        Self {
            registry,
            module: module.into(),
        }
    }

    /// Name of the module being initialized.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The traversal root of the document.
    pub fn root(&self) -> &Node {
        self.registry.root()
    }

    pub fn store(&self) -> &Store {
        self.registry.store()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Resolve other modules on behalf of this one.
    pub async fn resolve(
        &self,
        names: impl IntoModuleNames,
        options: ResolveOptions,
    ) -> Result<Resolution, RegistryError> {
        self.registry
            .resolve_as(Some(&self.module), names.into_module_names(), options)
            .await
    }

    /// Look a capability up in the shared namespace.
    pub fn capability(&self, name: &str) -> Option<Capability> {
        self.registry.capability(name)
    }

    pub fn capability_as<T: 'static>(&self, name: &str) -> Option<Rc<T>> {
        self.registry.capability_as(name)
    }
}

impl std::fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContext")
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}
