//! Module Registry
//!
//! Named modules are registered with a factory and instantiated lazily, at
//! most once, the first time they are resolved.
//!
//! # Resolution
//!
//! 1. An unresolved module moves to `Pending` and its resolution future is
//!    created and memoized. Every concurrent resolve of the same name awaits
//!    that one shared future, so the factory runs exactly once.
//!
//! 2. When the factory completes, its capabilities are merged into the
//!    shared namespace. A capability name that another module already
//!    provides fails the module instead.
//!
//! 3. The module settles as `Resolved` or `Failed`. Both are terminal.
//!
//! # Cycles
//!
//! A factory that waits on another module adds an edge to the wait-for
//! graph for the duration of the wait. An edge that would close a cycle is
//! refused with [`RegistryError::CircularResolution`], so a module whose
//! factory transitively resolves itself fails instead of waiting forever.
//!
//! The registry also remembers which factories are being polled right now.
//! A resolve issued through the bare [`Registry`] handle while a factory is
//! polled is attributed to the innermost one, the same as a resolve through
//! its [`ModuleContext`].

use std::cell::RefCell;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::{join_all, LocalBoxFuture, Shared};
use futures_util::FutureExt;
use indexmap::IndexMap;
use thiserror::Error;

use super::capability::{Capabilities, Capability};
use super::context::ModuleContext;
use super::graph::WaitGraph;
use super::resolution::{IntoModuleNames, ModuleSlot, PendingModule, ResolveOptions, Resolution};
use crate::dom::Node;
use crate::reactive::Store;

/// Error type returned by module factories.
pub type FactoryError = Box<dyn StdError>;

type FactoryFuture = LocalBoxFuture<'static, Result<Capabilities, FactoryError>>;
type Factory = Rc<dyn Fn(ModuleContext) -> FactoryFuture>;
pub(crate) type SharedResolution =
    Shared<LocalBoxFuture<'static, Result<Rc<Capabilities>, RegistryError>>>;

/// Errors raised by the module registry.
///
/// Cloneable so that every waiter on a shared resolution receives the same
/// error.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("module `{0}` is already registered")]
    DuplicateModule(String),

    #[error("module `{0}` is not registered")]
    UnknownModule(String),

    #[error("module `{module}` failed to initialize")]
    ModuleInit {
        module: String,
        #[source]
        source: Arc<dyn StdError>,
    },

    #[error("circular module resolution: {}", .cycle.join(" -> "))]
    CircularResolution { cycle: Vec<String> },

    #[error("capability `{capability}` of module `{module}` is already provided by `{owner}`")]
    CapabilityCollision {
        module: String,
        capability: String,
        owner: String,
    },
}

impl RegistryError {
    pub fn is_circular(&self) -> bool {
        matches!(self, RegistryError::CircularResolution { .. })
    }

    /// Name of the module this error is attributed to, if any.
    pub fn module(&self) -> Option<&str> {
        match self {
            RegistryError::DuplicateModule(module) | RegistryError::UnknownModule(module) => {
                Some(module)
            }
            RegistryError::ModuleInit { module, .. }
            | RegistryError::CapabilityCollision { module, .. } => Some(module),
            RegistryError::CircularResolution { cycle } => cycle.first().map(String::as_str),
        }
    }
}

/// Lifecycle state of a registered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Unresolved,
    Pending,
    Resolved,
    Failed,
}

enum Slot {
    Unresolved,
    Pending(SharedResolution),
    Resolved(Rc<Capabilities>),
    Failed(RegistryError),
}

struct ModuleEntry {
    factory: Factory,
    slot: Slot,
}

struct NamespaceEntry {
    owner: String,
    value: Capability,
}

struct RegistryInner {
    store: Store,
    root: Node,
    modules: RefCell<IndexMap<String, ModuleEntry>>,
    namespace: RefCell<IndexMap<String, NamespaceEntry>>,
    waits: RefCell<WaitGraph>,
    /// Resolutions started without waiting, driven by `settle`.
    background: RefCell<Vec<(String, SharedResolution)>>,
    /// Modules whose factory is being polled, innermost last.
    polling: RefCell<Vec<String>>,
}

/// Handle to a module registry. Clones share the same registry.
#[derive(Clone)]
pub struct Registry {
    inner: Rc<RegistryInner>,
}

/// What `start` found for a requested module.
enum Started {
    Ready(Rc<Capabilities>),
    Pending(SharedResolution),
}

impl Registry {
    /// Create a registry whose factories see `store` and traversal `root`.
    pub fn new(store: Store, root: Node) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                store,
                root,
                modules: RefCell::new(IndexMap::new()),
                namespace: RefCell::new(IndexMap::new()),
                waits: RefCell::new(WaitGraph::new()),
                background: RefCell::new(Vec::new()),
                polling: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn root(&self) -> &Node {
        &self.inner.root
    }

    /// Register a module factory under `name`.
    ///
    /// The factory is not called until the module is first resolved.
    pub fn register<F, Fut>(&self, name: &str, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(ModuleContext) -> Fut + 'static,
        Fut: Future<Output = Result<Capabilities, FactoryError>> + 'static,
    {
        let mut modules = self.inner.modules.borrow_mut();
        if modules.contains_key(name) {
            return Err(RegistryError::DuplicateModule(name.to_string()));
        }
        let factory: Factory = Rc::new(move |cx| factory(cx).boxed_local());
        modules.insert(
            name.to_string(),
            ModuleEntry {
                factory,
                slot: Slot::Unresolved,
            },
        );
        tracing::debug!(module = name, "module registered");
        Ok(())
    }

    /// Resolve one or more modules.
    ///
    /// Independent modules resolve concurrently. With
    /// [`ResolveOptions::wait`] the returned resolution holds only ready
    /// slots, and the first failing module (in request order) fails the call.
    ///
    /// Called while a factory is being polled, the wait is attributed to that
    /// factory's module.
    pub async fn resolve(
        &self,
        names: impl IntoModuleNames,
        options: ResolveOptions,
    ) -> Result<Resolution, RegistryError> {
        let requester = self.polled_module();
        self.resolve_as(requester.as_deref(), names.into_module_names(), options)
            .await
    }

    /// Innermost module whose factory is being polled.
    fn polled_module(&self) -> Option<String> {
        self.inner.polling.borrow().last().cloned()
    }

    pub(crate) async fn resolve_as(
        &self,
        requester: Option<&str>,
        names: Vec<String>,
        options: ResolveOptions,
    ) -> Result<Resolution, RegistryError> {
        let mut started = IndexMap::with_capacity(names.len());
        for name in names {
            if started.contains_key(&name) {
                continue;
            }
            let state = self.start(&name)?;
            started.insert(name, state);
        }

        if options.wait_on_init {
            self.wait_for(requester, started).await
        } else {
            Ok(self.start_in_background(started))
        }
    }

    /// Look up a module, starting its resolution if it is unresolved.
    fn start(&self, name: &str) -> Result<Started, RegistryError> {
        let mut modules = self.inner.modules.borrow_mut();
        let entry = modules
            .get_mut(name)
            .ok_or_else(|| RegistryError::UnknownModule(name.to_string()))?;

        match &entry.slot {
            Slot::Resolved(caps) => return Ok(Started::Ready(Rc::clone(caps))),
            Slot::Failed(error) => return Err(error.clone()),
            Slot::Pending(future) => return Ok(Started::Pending(future.clone())),
            Slot::Unresolved => {}
        }

        let future = self.resolution_future(name, Rc::clone(&entry.factory));
        entry.slot = Slot::Pending(future.clone());
        tracing::debug!(module = name, "module pending");
        Ok(Started::Pending(future))
    }

    /// The memoized resolution of one module.
    ///
    /// The factory is only invoked when the future is first polled, so no
    /// registry borrow is held while it runs.
    fn resolution_future(&self, name: &str, factory: Factory) -> SharedResolution {
        let registry = self.clone();
        let name = name.to_string();
        let context = ModuleContext::new(registry.clone(), &name);
        let running = Polling {
            registry: registry.clone(),
            module: name.clone(),
            future: async move { factory(context).await }.boxed_local(),
        };
        async move {
            let outcome = match running.await {
                Ok(caps) => registry.merge(&name, caps),
                Err(error) => Err(init_error(&name, error)),
            };
            registry.settle_module(&name, &outcome);
            outcome
        }
        .boxed_local()
        .shared()
    }

    /// Merge a module's capabilities into the shared namespace.
    ///
    /// Either every capability is merged or none is.
    fn merge(&self, module: &str, caps: Capabilities) -> Result<Rc<Capabilities>, RegistryError> {
        let mut namespace = self.inner.namespace.borrow_mut();
        for name in caps.names() {
            if let Some(existing) = namespace.get(name) {
                return Err(RegistryError::CapabilityCollision {
                    module: module.to_string(),
                    capability: name.to_string(),
                    owner: existing.owner.clone(),
                });
            }
        }
        for (name, value) in caps.iter() {
            namespace.insert(
                name.to_string(),
                NamespaceEntry {
                    owner: module.to_string(),
                    value: Rc::clone(value),
                },
            );
        }
        Ok(Rc::new(caps))
    }

    fn settle_module(&self, name: &str, outcome: &Result<Rc<Capabilities>, RegistryError>) {
        let mut modules = self.inner.modules.borrow_mut();
        let Some(entry) = modules.get_mut(name) else {
            return;
        };
        entry.slot = match outcome {
            Ok(caps) => {
                tracing::debug!(module = name, capabilities = caps.len(), "module resolved");
                Slot::Resolved(Rc::clone(caps))
            }
            Err(error) => {
                tracing::debug!(module = name, %error, "module failed");
                Slot::Failed(error.clone())
            }
        };
    }

    async fn wait_for(
        &self,
        requester: Option<&str>,
        started: IndexMap<String, Started>,
    ) -> Result<Resolution, RegistryError> {
        let mut edges = WaitEdges::new(self, requester);
        let mut waits = Vec::new();
        for (name, state) in &started {
            if let Started::Pending(future) = state {
                edges.add(name)?;
                waits.push(future.clone());
            }
        }

        let mut results = join_all(waits).await.into_iter();
        drop(edges);

        let mut resolution = Resolution::default();
        for (name, state) in started {
            let caps = match state {
                Started::Ready(caps) => caps,
                Started::Pending(_) => match results.next() {
                    Some(result) => result?,
                    None => continue,
                },
            };
            resolution.insert(name, ModuleSlot::Ready(caps));
        }
        Ok(resolution)
    }

    fn start_in_background(&self, started: IndexMap<String, Started>) -> Resolution {
        let mut resolution = Resolution::default();
        for (name, state) in started {
            let slot = match state {
                Started::Ready(caps) => ModuleSlot::Ready(caps),
                Started::Pending(future) => match future.clone().now_or_never() {
                    Some(Ok(caps)) => ModuleSlot::Ready(caps),
                    // Failed immediately: still handed to `settle` so it is reported
                    Some(Err(_)) => {
                        self.inner
                            .background
                            .borrow_mut()
                            .push((name.clone(), future.clone()));
                        ModuleSlot::Pending(PendingModule::new(&name, future))
                    }
                    None => {
                        self.inner
                            .background
                            .borrow_mut()
                            .push((name.clone(), future.clone()));
                        ModuleSlot::Pending(PendingModule::new(&name, future))
                    }
                },
            };
            resolution.insert(name, slot);
        }
        resolution
    }

    /// Drive every resolution started without waiting to completion.
    ///
    /// Returns the failures among them. Resolutions started while settling
    /// are driven too.
    pub async fn settle(&self) -> Vec<RegistryError> {
        let mut failures = Vec::new();
        loop {
            let batch = std::mem::take(&mut *self.inner.background.borrow_mut());
            if batch.is_empty() {
                break;
            }
            tracing::trace!(count = batch.len(), "settling background modules");
            let results = join_all(batch.into_iter().map(|(_, future)| future)).await;
            failures.extend(results.into_iter().filter_map(Result::err));
        }
        failures
    }

    /// Number of resolutions started in the background that `settle` has not
    /// yet driven.
    pub fn background_count(&self) -> usize {
        self.inner.background.borrow().len()
    }

    /// Modules that `module`'s factory is currently waiting on.
    pub fn waiting_on(&self, module: &str) -> Vec<String> {
        self.inner.waits.borrow().waiting_on(module)
    }

    pub fn state(&self, module: &str) -> Option<ModuleState> {
        self.inner
            .modules
            .borrow()
            .get(module)
            .map(|entry| match entry.slot {
                Slot::Unresolved => ModuleState::Unresolved,
                Slot::Pending(_) => ModuleState::Pending,
                Slot::Resolved(_) => ModuleState::Resolved,
                Slot::Failed(_) => ModuleState::Failed,
            })
    }

    pub fn contains(&self, module: &str) -> bool {
        self.inner.modules.borrow().contains_key(module)
    }

    pub fn module_names(&self) -> Vec<String> {
        self.inner.modules.borrow().keys().cloned().collect()
    }

    /// Look a capability up in the shared namespace.
    pub fn capability(&self, name: &str) -> Option<Capability> {
        self.inner
            .namespace
            .borrow()
            .get(name)
            .map(|entry| Rc::clone(&entry.value))
    }

    pub fn capability_as<T: 'static>(&self, name: &str) -> Option<Rc<T>> {
        self.capability(name)?.downcast::<T>().ok()
    }

    /// Module that contributed capability `name`.
    pub fn provider_of(&self, name: &str) -> Option<String> {
        self.inner
            .namespace
            .borrow()
            .get(name)
            .map(|entry| entry.owner.clone())
    }

    pub fn capability_names(&self) -> Vec<String> {
        self.inner.namespace.borrow().keys().cloned().collect()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("modules", &self.module_names())
            .field("capabilities", &self.capability_names())
            .finish()
    }
}

/// Map a factory error onto the module it came from.
///
/// A circular-resolution error passes through unchanged so the cycle stays
/// visible to whoever resolved the outermost module.
fn init_error(module: &str, error: FactoryError) -> RegistryError {
    match error.downcast::<RegistryError>() {
        Ok(registry_error) if registry_error.is_circular() => *registry_error,
        Ok(registry_error) => RegistryError::ModuleInit {
            module: module.to_string(),
            source: Arc::new(*registry_error),
        },
        Err(other) => RegistryError::ModuleInit {
            module: module.to_string(),
            source: Arc::from(other),
        },
    }
}

/// A factory future that marks its module as being polled.
struct Polling {
    registry: Registry,
    module: String,
    future: FactoryFuture,
}

impl Future for Polling {
    type Output = Result<Capabilities, FactoryError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let _polled = PolledModule::enter(&this.registry, &this.module);
        this.future.as_mut().poll(cx)
    }
}

/// Entry on the polling stack, popped on drop.
struct PolledModule<'a> {
    registry: &'a Registry,
}

impl<'a> PolledModule<'a> {
    fn enter(registry: &'a Registry, module: &str) -> Self {
        registry.inner.polling.borrow_mut().push(module.to_string());
        Self { registry }
    }
}

impl Drop for PolledModule<'_> {
    fn drop(&mut self) {
        self.registry.inner.polling.borrow_mut().pop();
    }
}

/// Wait-for edges held by one waiting requester, removed on drop.
struct WaitEdges<'a> {
    registry: &'a Registry,
    requester: Option<&'a str>,
    targets: Vec<String>,
}

impl<'a> WaitEdges<'a> {
    fn new(registry: &'a Registry, requester: Option<&'a str>) -> Self {
        Self {
            registry,
            requester,
            targets: Vec::new(),
        }
    }

    fn add(&mut self, target: &str) -> Result<(), RegistryError> {
        let Some(requester) = self.requester else {
            return Ok(());
        };
        self.registry
            .inner
            .waits
            .borrow_mut()
            .add_edge(requester, target)
            .map_err(|cycle| {
                tracing::debug!(requester, target, "circular module resolution");
                RegistryError::CircularResolution { cycle }
            })?;
        self.targets.push(target.to_string());
        Ok(())
    }
}

impl Drop for WaitEdges<'_> {
    fn drop(&mut self) {
        let Some(requester) = self.requester else {
            return;
        };
        let mut waits = self.registry.inner.waits.borrow_mut();
        for target in &self.targets {
            waits.remove_edge(requester, target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;

    fn registry() -> Registry {
        Registry::new(Store::new(), Node::element("main"))
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = registry();
        registry
            .register("a", |_| async { Ok::<_, FactoryError>(Capabilities::new()) })
            .unwrap();
        let err = registry
            .register("a", |_| async { Ok::<_, FactoryError>(Capabilities::new()) })
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateModule(name) if name == "a"));
    }

    #[tokio::test]
    async fn factory_runs_once_and_merges_capabilities() {
        let registry = registry();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        registry
            .register("math", move |_| {
                counter.set(counter.get() + 1);
                async { Ok::<_, FactoryError>(Capabilities::new().with("two", 2_i32)) }
            })
            .unwrap();

        assert_eq!(registry.state("math"), Some(ModuleState::Unresolved));
        let first = registry.resolve("math", ResolveOptions::wait()).await.unwrap();
        let second = registry.resolve("math", ResolveOptions::wait()).await.unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(first.capability_as::<i32>("math", "two").as_deref(), Some(&2));
        assert!(Rc::ptr_eq(
            &first.capabilities("math").unwrap(),
            &second.capabilities("math").unwrap()
        ));
        assert_eq!(registry.capability_as::<i32>("two").as_deref(), Some(&2));
        assert_eq!(registry.provider_of("two").as_deref(), Some("math"));
        assert_eq!(registry.state("math"), Some(ModuleState::Resolved));
    }

    #[tokio::test]
    async fn unknown_module_is_an_error() {
        let err = registry()
            .resolve("missing", ResolveOptions::wait())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownModule(_)));
    }

    #[tokio::test]
    async fn failure_is_attributed_and_isolated() {
        let registry = registry();
        registry
            .register("bad", |_| async { Err::<Capabilities, FactoryError>("boom".into()) })
            .unwrap();
        registry
            .register("good", |_| async { Ok::<_, FactoryError>(Capabilities::new().with("ok", true)) })
            .unwrap();

        let err = registry
            .resolve(["bad", "good"], ResolveOptions::wait())
            .await
            .unwrap_err();
        match &err {
            RegistryError::ModuleInit { module, source } => {
                assert_eq!(module, "bad");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }

        // The sibling still resolved, and the failure is memoized
        assert_eq!(registry.state("good"), Some(ModuleState::Resolved));
        assert_eq!(registry.state("bad"), Some(ModuleState::Failed));
        assert!(registry.resolve("bad", ResolveOptions::wait()).await.is_err());
    }

    #[tokio::test]
    async fn capability_collision_fails_the_later_module() {
        let registry = registry();
        registry
            .register("first", |_| async { Ok::<_, FactoryError>(Capabilities::new().with("shared", 1_i32)) })
            .unwrap();
        registry
            .register("second", |_| async {
                Ok::<_, FactoryError>(Capabilities::new().with("own", 0_i32).with("shared", 2_i32))
            })
            .unwrap();

        registry.resolve("first", ResolveOptions::wait()).await.unwrap();
        let err = registry
            .resolve("second", ResolveOptions::wait())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RegistryError::CapabilityCollision { ref capability, ref owner, .. }
                if capability == "shared" && owner == "first"
        ));
        // Nothing from the failed module was merged
        assert!(registry.capability("own").is_none());
        assert_eq!(registry.capability_as::<i32>("shared").as_deref(), Some(&1));
    }

    #[tokio::test]
    async fn self_resolution_is_circular() {
        let registry = registry();
        registry
            .register("loop", |cx: ModuleContext| async move {
                cx.resolve("loop", ResolveOptions::wait()).await?;
                Ok::<_, FactoryError>(Capabilities::new())
            })
            .unwrap();

        let err = registry
            .resolve("loop", ResolveOptions::wait())
            .await
            .unwrap_err();
        assert!(err.is_circular(), "{err}");
    }

    #[tokio::test]
    async fn background_resolution_is_settled_later() {
        let registry = registry();
        registry
            .register("slow", |_| async {
                tokio::task::yield_now().await;
                Ok::<_, FactoryError>(Capabilities::new().with("ready", true))
            })
            .unwrap();

        let resolution = registry
            .resolve("slow", ResolveOptions::background())
            .await
            .unwrap();
        assert!(!resolution.is_ready());
        assert_eq!(registry.state("slow"), Some(ModuleState::Pending));
        assert_eq!(registry.background_count(), 1);

        assert!(registry.settle().await.is_empty());
        assert!(resolution.is_ready());
        assert_eq!(registry.state("slow"), Some(ModuleState::Resolved));
    }

    #[tokio::test]
    async fn resolving_itself_through_the_registry_is_circular() {
        let registry = registry();
        registry
            .register("loop", |cx: ModuleContext| async move {
                let registry = cx.registry().clone();
                registry.resolve("loop", ResolveOptions::wait()).await?;
                Ok::<_, FactoryError>(Capabilities::new())
            })
            .unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            registry.resolve("loop", ResolveOptions::wait()),
        )
        .await
        .expect("resolution must not hang");
        let err = outcome.unwrap_err();
        assert!(err.is_circular(), "{err}");
        assert_eq!(registry.state("loop"), Some(ModuleState::Failed));
    }

    #[tokio::test]
    async fn captured_registry_cycle_is_circular() {
        let registry = registry();
        let captured = registry.clone();
        registry
            .register("a", |cx: ModuleContext| async move {
                cx.resolve("b", ResolveOptions::wait()).await?;
                Ok::<_, FactoryError>(Capabilities::new())
            })
            .unwrap();
        registry
            .register("b", move |_| {
                let registry = captured.clone();
                async move {
                    tokio::task::yield_now().await;
                    registry.resolve("a", ResolveOptions::wait()).await?;
                    Ok::<_, FactoryError>(Capabilities::new())
                }
            })
            .unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            registry.resolve("a", ResolveOptions::wait()),
        )
        .await
        .expect("resolution must not hang");
        let err = outcome.unwrap_err();
        match &err {
            RegistryError::CircularResolution { cycle } => {
                assert_eq!(cycle, &["b", "a", "b"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(registry.waiting_on("a").is_empty());
        assert!(registry.waiting_on("b").is_empty());
    }

    #[tokio::test]
    async fn top_level_resolve_has_no_requester() {
        let registry = registry();
        registry
            .register("leaf", |_| async { Ok::<_, FactoryError>(Capabilities::new()) })
            .unwrap();

        // Not inside any factory, so no wait edge is recorded
        assert!(registry.polled_module().is_none());
        registry.resolve("leaf", ResolveOptions::wait()).await.unwrap();
        assert!(registry.polled_module().is_none());
    }

    #[tokio::test]
    async fn immediate_background_failure_is_settled() {
        let registry = registry();
        registry
            .register("bad", |_| async { Err::<Capabilities, FactoryError>("boom".into()) })
            .unwrap();

        let resolution = registry
            .resolve("bad", ResolveOptions::background())
            .await
            .unwrap();
        assert!(!resolution.is_ready());
        assert_eq!(registry.state("bad"), Some(ModuleState::Failed));
        assert_eq!(registry.background_count(), 1);

        let failures = registry.settle().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].module(), Some("bad"));
        assert!(registry.settle().await.is_empty());
    }

    #[tokio::test]
    async fn waiting_after_background_sees_the_finished_module() {
        let registry = registry();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        registry
            .register("slow", move |_| {
                counter.set(counter.get() + 1);
                async {
                    tokio::task::yield_now().await;
                    Ok::<_, FactoryError>(Capabilities::new().with("ready", true).with("n", 7_i32))
                }
            })
            .unwrap();

        let background = registry
            .resolve("slow", ResolveOptions::background())
            .await
            .unwrap();
        assert_eq!(registry.state("slow"), Some(ModuleState::Pending));
        assert!(background.capabilities("slow").is_none());

        let waited = registry.resolve("slow", ResolveOptions::wait()).await.unwrap();
        let caps = waited.capabilities("slow").unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(caps.get_as::<bool>("ready").as_deref(), Some(&true));
        assert_eq!(caps.get_as::<i32>("n").as_deref(), Some(&7));
        assert!(Rc::ptr_eq(&caps, &background.capabilities("slow").unwrap()));
        assert!(registry.settle().await.is_empty());
    }
}
