//! Application start-up.
//!
//! [`App`] ties the subsystems together: one store, one registry whose
//! factories see the document, and one directive engine. The engine is
//! published to modules as the `engine` capability of the built-in
//! `directives` module, so a module adds directives by resolving it.
//!
//! [`App::start`] then runs the start-up sequence:
//!
//! 1. Resolve the requested modules and wait for them.
//! 2. Bind the document.
//! 3. Drive background module resolutions and queued engine work until
//!    neither has anything left.

use std::future::Future;
use std::rc::Rc;

use crate::config::Config;
use crate::directive::{DirectiveEngine, ScanReport};
use crate::dom::Node;
use crate::error::Result;
use crate::reactive::Store;
use crate::registry::{
    Capabilities, FactoryError, IntoModuleNames, ModuleContext, Registry, RegistryError,
    ResolveOptions,
};

/// Name of the built-in module that publishes the directive engine.
pub const DIRECTIVES_MODULE: &str = "directives";

/// Capability under which [`DIRECTIVES_MODULE`] publishes the engine.
pub const ENGINE_CAPABILITY: &str = "engine";

/// What [`App::start`] did.
#[derive(Debug, Default)]
pub struct StartReport {
    /// Modules resolved in step 1, in request order.
    pub modules: Vec<String>,
    pub scan: ScanReport,
    /// Background resolutions that failed while settling.
    pub background_failures: Vec<RegistryError>,
    /// Queued engine tasks driven while settling.
    pub settled_tasks: usize,
}

pub struct App {
    config: Config,
    store: Store,
    registry: Registry,
    engine: DirectiveEngine,
    document: Node,
}

impl App {
    pub fn new(document: Node, config: Config) -> Result<Self> {
        config.validate()?;
        let store = Store::with_config(&config.signals);
        let engine = DirectiveEngine::with_builtins(store.clone(), config.directives.clone())?;
        let registry = Registry::new(store.clone(), document.clone());

        let published = engine.clone();
        registry.register(DIRECTIVES_MODULE, move |_: ModuleContext| {
            let engine = published.clone();
            async move {
                Ok::<_, FactoryError>(Capabilities::new().with(ENGINE_CAPABILITY, engine))
            }
        })?;

        tracing::debug!(root = %document.id(), "app created");
        Ok(Self {
            config,
            store,
            registry,
            engine,
            document,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn engine(&self) -> &DirectiveEngine {
        &self.engine
    }

    pub fn document(&self) -> &Node {
        &self.document
    }

    /// Register a module with the app's registry.
    pub fn register_module<F, Fut>(&self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(ModuleContext) -> Fut + 'static,
        Fut: Future<Output = std::result::Result<Capabilities, FactoryError>> + 'static,
    {
        self.registry.register(name, factory)?;
        Ok(())
    }

    /// Resolve `modules`, bind the document, then settle deferred work.
    pub async fn start(&self, modules: impl IntoModuleNames) -> Result<StartReport> {
        let resolution = self.registry.resolve(modules, ResolveOptions::wait()).await?;
        let mut report = StartReport {
            modules: resolution.names().map(str::to_string).collect(),
            ..StartReport::default()
        };
        tracing::debug!(modules = ?report.modules, "modules resolved");

        report.scan = self.engine.scan(&self.document).await?;

        loop {
            let background = self.registry.background_count();
            let failures = self.registry.settle().await;
            for failure in &failures {
                tracing::warn!(error = %failure, "background module failed");
            }
            report.background_failures.extend(failures);

            let driven = self.engine.settle().await;
            report.settled_tasks += driven;
            if background == 0 && driven == 0 {
                break;
            }
        }

        tracing::debug!(
            bound = report.scan.bound,
            failed = report.scan.failed,
            settled = report.settled_tasks,
            "app started"
        );
        Ok(report)
    }

    /// The engine as published to modules.
    pub fn published_engine(&self) -> Option<Rc<DirectiveEngine>> {
        self.registry.capability_as::<DirectiveEngine>(ENGINE_CAPABILITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{Directive, DirectiveContext, DirectiveError, DirectivePattern, MatcherContext};

    #[tokio::test]
    async fn modules_register_directives_through_the_engine_capability() {
        let target = Node::element("div").with_attribute("x-shout", "hi");
        let document = Node::document().with_child(Node::element("main").with_child(target.clone()));
        let app = App::new(document, Config::default()).unwrap();

        app.register_module("shout", |cx: ModuleContext| async move {
            let resolution = cx.resolve(DIRECTIVES_MODULE, ResolveOptions::wait()).await?;
            let engine = resolution
                .capability_as::<DirectiveEngine>(DIRECTIVES_MODULE, ENGINE_CAPABILITY)
                .ok_or("engine capability missing")?;
            let pattern = DirectivePattern::new(engine.config(), "shout").build()?;
            engine.register_directive(
                "shout",
                Directive::new(
                    move |_: &MatcherContext<'_>| Some(pattern.clone()),
                    |cx: DirectiveContext| async move {
                        cx.element().set_text_content(&cx.expression().to_uppercase());
                        Ok::<_, DirectiveError>(())
                    },
                ),
            )?;
            Ok::<_, FactoryError>(Capabilities::new())
        })
        .unwrap();

        let report = app.start("shout").await.unwrap();
        assert_eq!(report.modules, vec!["shout"]);
        assert_eq!(report.scan.bound, 1);
        assert_eq!(target.text_content(), "HI");
        assert!(app.published_engine().is_some());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = Config::default();
        config.directives.prefix.clear();
        assert!(matches!(
            App::new(Node::document(), config),
            Err(crate::Error::Config(_))
        ));
    }
}
