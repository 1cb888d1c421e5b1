//! Directive Engine
//!
//! The engine owns the registered directives and every binding they create.
//!
//! # Binding Pass
//!
//! [`DirectiveEngine::scan`] drives the document traverser over a subtree.
//! For each element:
//!
//! 1. An element carrying the ignore attribute is skipped together with its
//!    subtree.
//! 2. Every attribute is offered to every directive's matcher. A matcher
//!    that declines, or whose pattern does not match the attribute name,
//!    creates nothing.
//! 3. Matches run in directive priority order, so `data` establishes the
//!    element's scope before anything evaluates against it. Each match
//!    becomes a binding; a failing callback tears its binding down and is
//!    reported to the error sink.
//! 4. `template` elements are not descended into: their children are
//!    content for `if`/`for` to render.
//!
//! # Deferred Work
//!
//! Watchers run synchronously, but rendering may need to scan fresh nodes,
//! which is async. Such work is polled once immediately and, if it
//! suspends, queued until [`DirectiveEngine::settle`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures_util::future::{join_all, LocalBoxFuture};
use futures_util::FutureExt;
use regex::Regex;
use thiserror::Error;

use super::binding::{BindingId, BindingInfo, BindingRecord, BindingState, Resources};
use super::builtin;
use super::context::DirectiveContext;
use super::matcher::{MatcherContext, Matches};
use crate::config::DirectiveConfig;
use crate::dom::{traverse, Descent, ListenerId, Node, NodeId, NodeType, TraversalError};
use crate::expr::{EvalError, ExpressionCache, Function, ParseError, Scope, Value};
use crate::reactive::{Store, StoreError, Watcher};

/// Errors a directive callback can fail a binding with.
#[derive(Debug, Clone, Error)]
pub enum DirectiveError {
    #[error("cannot parse `{expression}`: {source}")]
    Parse {
        expression: String,
        source: ParseError,
    },

    #[error("cannot evaluate `{expression}`: {source}")]
    Eval {
        expression: String,
        source: EvalError,
    },

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A binding failure as delivered to the error sink.
#[derive(Debug, Clone, Error)]
#[error("directive `{directive}` ({attribute}) on {element} failed: {error}")]
pub struct BindingFailure {
    pub directive: String,
    pub attribute: String,
    pub element: NodeId,
    pub error: DirectiveError,
}

/// Errors raised by the engine itself.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("directive `{0}` is already registered")]
    DuplicateDirective(String),

    #[error("invalid directive pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A scoping directive failed, so the subtrees below it were not bound.
    #[error(transparent)]
    Traversal(#[from] TraversalError<DirectiveError>),
}

type Matcher = dyn Fn(&MatcherContext<'_>) -> Option<Regex>;
type Callback = dyn Fn(DirectiveContext) -> LocalBoxFuture<'static, Result<(), DirectiveError>>;
type ErrorSink = dyn Fn(&BindingFailure);

/// A matcher plus the callback run for every attribute it matches.
pub struct Directive {
    matcher: Box<Matcher>,
    callback: Rc<Callback>,
    priority: i32,
    scoping: bool,
}

impl Directive {
    pub fn new<M, C, Fut>(matcher: M, callback: C) -> Self
    where
        M: Fn(&MatcherContext<'_>) -> Option<Regex> + 'static,
        C: Fn(DirectiveContext) -> Fut + 'static,
        Fut: Future<Output = Result<(), DirectiveError>> + 'static,
    {
        Self {
            matcher: Box::new(matcher),
            callback: Rc::new(move |cx| callback(cx).boxed_local()),
            priority: 0,
            scoping: false,
        }
    }

    /// Lower priorities run first on an element. The default is 0.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Mark the directive as establishing scope for its subtree.
    ///
    /// When a scoping binding fails, the element's descendants are not
    /// bound and the failure is returned from the scan.
    pub fn scoping(mut self) -> Self {
        self.scoping = true;
        self
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

struct DirectiveEntry {
    name: String,
    directive: Directive,
}

/// A resource handed to a binding.
pub(crate) enum Resource {
    Watcher(Watcher),
    Listener(Node, ListenerId),
    Rendered(Node),
    Cleanup(Box<dyn FnOnce()>),
}

/// Counts from one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub elements: usize,
    pub bound: usize,
    pub failed: usize,
}

struct Candidate {
    entry: Rc<DirectiveEntry>,
    attribute: String,
    expression: String,
    matches: Matches,
}

pub(crate) struct EngineInner {
    store: Store,
    config: DirectiveConfig,
    directives: RefCell<Vec<Rc<DirectiveEntry>>>,
    bindings: RefCell<HashMap<NodeId, Vec<BindingRecord>>>,
    scopes: RefCell<HashMap<NodeId, Scope>>,
    globals: Scope,
    cache: ExpressionCache,
    sink: RefCell<Rc<ErrorSink>>,
    queue: RefCell<Vec<LocalBoxFuture<'static, ()>>>,
}

/// Handle to a directive engine. Clones share the same engine.
#[derive(Clone)]
pub struct DirectiveEngine {
    inner: Rc<EngineInner>,
}

/// Non-owning engine handle held by watchers and listeners.
#[derive(Clone)]
pub(crate) struct WeakEngine(Weak<EngineInner>);

impl WeakEngine {
    pub(crate) fn upgrade(&self) -> Option<DirectiveEngine> {
        self.0.upgrade().map(|inner| DirectiveEngine { inner })
    }
}

impl DirectiveEngine {
    /// Create an engine with no directives registered.
    pub fn new(store: Store, config: DirectiveConfig) -> Self {
        let globals = global_scope(&store);
        Self {
            inner: Rc::new(EngineInner {
                store,
                config,
                directives: RefCell::new(Vec::new()),
                bindings: RefCell::new(HashMap::new()),
                scopes: RefCell::new(HashMap::new()),
                globals,
                cache: ExpressionCache::new(),
                sink: RefCell::new(Rc::new(default_sink) as Rc<ErrorSink>),
                queue: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Create an engine with `data`, `bind`, `on`, `if` and `for`
    /// registered.
    pub fn with_builtins(store: Store, config: DirectiveConfig) -> Result<Self, EngineError> {
        let engine = Self::new(store, config);
        builtin::register_builtins(&engine)?;
        Ok(engine)
    }

    pub(crate) fn downgrade(&self) -> WeakEngine {
        WeakEngine(Rc::downgrade(&self.inner))
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn config(&self) -> &DirectiveConfig {
        &self.inner.config
    }

    /// Root scope every element scope descends from.
    pub fn globals(&self) -> &Scope {
        &self.inner.globals
    }

    pub fn cache(&self) -> &ExpressionCache {
        &self.inner.cache
    }

    pub fn register_directive(&self, name: &str, directive: Directive) -> Result<(), EngineError> {
        let mut directives = self.inner.directives.borrow_mut();
        if directives.iter().any(|entry| entry.name == name) {
            return Err(EngineError::DuplicateDirective(name.to_string()));
        }
        directives.push(Rc::new(DirectiveEntry {
            name: name.to_string(),
            directive,
        }));
        // Stable, so equal priorities keep registration order
        directives.sort_by_key(|entry| entry.directive.priority);
        tracing::debug!(directive = name, "directive registered");
        Ok(())
    }

    /// Registered directive names in the order they are tried.
    pub fn directive_names(&self) -> Vec<String> {
        self.inner
            .directives
            .borrow()
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Replace the error sink. The default sink logs a warning.
    pub fn on_error(&self, sink: impl Fn(&BindingFailure) + 'static) {
        *self.inner.sink.borrow_mut() = Rc::new(sink);
    }

    pub(crate) fn report(&self, failure: BindingFailure) {
        let sink = Rc::clone(&self.inner.sink.borrow());
        sink(&failure);
    }

    // ------------------------------------------------------------------
    // Binding pass
    // ------------------------------------------------------------------

    /// Bind every matching attribute in the subtree under `root`.
    ///
    /// Elements that are already bound keep their bindings; only new
    /// matches are bound.
    pub async fn scan(&self, root: &Node) -> Result<ScanReport, EngineError> {
        let report = Cell::new(ScanReport::default());
        traverse(root, |element| self.visit(element, &report), &[NodeType::Element]).await?;
        let report = report.get();
        tracing::debug!(
            root = %root.id(),
            elements = report.elements,
            bound = report.bound,
            failed = report.failed,
            "scan finished"
        );
        Ok(report)
    }

    async fn visit(
        &self,
        element: Node,
        report: &Cell<ScanReport>,
    ) -> Result<Descent, DirectiveError> {
        let config = &self.inner.config;
        if element.has_attribute(&config.attribute(&config.ignore)) {
            tracing::trace!(element = %element.id(), "ignored subtree");
            return Ok(Descent::Stop);
        }

        let candidates = self.match_element(&element);
        let mut stats = report.get();
        stats.elements += 1;
        report.set(stats);

        let mut scope_failure = None;
        for candidate in candidates {
            let scoping = candidate.entry.directive.scoping;
            let outcome = self.bind(candidate, &element).await;

            let mut stats = report.get();
            match outcome {
                Ok(()) => stats.bound += 1,
                Err(error) => {
                    stats.failed += 1;
                    if scoping && scope_failure.is_none() {
                        scope_failure = Some(error);
                    }
                }
            }
            report.set(stats);
        }

        if let Some(error) = scope_failure {
            return Err(error);
        }
        Ok(if element.is_template() {
            Descent::Stop
        } else {
            Descent::Continue
        })
    }

    fn match_element(&self, element: &Node) -> Vec<Candidate> {
        let directives = self.inner.directives.borrow().clone();
        let mut candidates = Vec::new();

        for (name, value) in element.attributes() {
            for entry in &directives {
                if self.has_binding(element, &entry.name, &name) {
                    continue;
                }
                let context = MatcherContext {
                    element,
                    name: &name,
                    value: &value,
                    config: &self.inner.config,
                };
                let Some(pattern) = (entry.directive.matcher)(&context) else {
                    continue;
                };
                let Some(captures) = pattern.captures(&name) else {
                    continue;
                };
                candidates.push(Candidate {
                    entry: Rc::clone(entry),
                    attribute: name.clone(),
                    expression: value.clone(),
                    matches: Matches::from_captures(&captures),
                });
            }
        }

        candidates.sort_by_key(|candidate| candidate.entry.directive.priority);
        candidates
    }

    fn has_binding(&self, element: &Node, directive: &str, attribute: &str) -> bool {
        self.inner
            .bindings
            .borrow()
            .get(&element.id())
            .is_some_and(|records| {
                records.iter().any(|record| {
                    record.is_live() && record.directive == directive && record.attribute == attribute
                })
            })
    }

    async fn bind(&self, candidate: Candidate, element: &Node) -> Result<(), DirectiveError> {
        let Candidate {
            entry,
            attribute,
            expression,
            matches,
        } = candidate;

        let record = BindingRecord::new(&entry.name, &attribute, element);
        let id = record.id;
        self.inner
            .bindings
            .borrow_mut()
            .entry(element.id())
            .or_default()
            .push(record);
        tracing::trace!(binding = %id, directive = %entry.name, %attribute, "binding matched");

        // Scope is looked up per binding so `data` on the same element applies
        let scope = self.scope_for(element);
        let context = DirectiveContext {
            engine: self.clone(),
            binding: id,
            directive: entry.name.as_str().into(),
            element: element.clone(),
            attribute: attribute.clone(),
            expression,
            matches,
            scope,
        };

        match (entry.directive.callback)(context).await {
            Ok(()) => {
                self.mark_bound(element.id(), id);
                Ok(())
            }
            Err(error) => {
                self.teardown_binding(element.id(), id);
                self.report(BindingFailure {
                    directive: entry.name.clone(),
                    attribute,
                    element: element.id(),
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    fn mark_bound(&self, element: NodeId, id: BindingId) {
        let mut bindings = self.inner.bindings.borrow_mut();
        let Some(record) = bindings
            .get_mut(&element)
            .and_then(|records| records.iter_mut().find(|record| record.id == id))
        else {
            // Torn down while its callback ran
            return;
        };
        if record.state == BindingState::Matched {
            record.state = BindingState::Bound;
            tracing::debug!(binding = %id, directive = %record.directive, "binding bound");
        }
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    /// Scope expressions on `node` evaluate against: the nearest scope set
    /// on the node or an ancestor, else the globals.
    pub fn scope_for(&self, node: &Node) -> Scope {
        let scopes = self.inner.scopes.borrow();
        let mut current = Some(node.clone());
        while let Some(node) = current {
            if let Some(scope) = scopes.get(&node.id()) {
                return scope.clone();
            }
            current = node.parent();
        }
        self.inner.globals.clone()
    }

    /// Set the scope for `node` and its subtree.
    pub fn set_scope(&self, node: &Node, scope: Scope) {
        self.inner.scopes.borrow_mut().insert(node.id(), scope);
    }

    /// Set the scope for `node`, returning the one it replaces.
    pub(crate) fn replace_scope(&self, node: &Node, scope: Scope) -> Option<Scope> {
        self.inner.scopes.borrow_mut().insert(node.id(), scope)
    }

    /// Undo [`replace_scope`](Self::replace_scope) if `scope` is still the
    /// one set on `node`.
    pub(crate) fn restore_scope(&self, node: NodeId, scope: &Scope, previous: Option<Scope>) {
        let mut scopes = self.inner.scopes.borrow_mut();
        if !scopes.get(&node).is_some_and(|current| current.ptr_eq(scope)) {
            return;
        }
        match previous {
            Some(previous) => scopes.insert(node, previous),
            None => scopes.remove(&node),
        };
    }

    // ------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------

    /// Bindings currently active on `node`.
    pub fn bindings_for(&self, node: &Node) -> Vec<BindingInfo> {
        self.inner
            .bindings
            .borrow()
            .get(&node.id())
            .map(|records| records.iter().map(BindingRecord::info).collect())
            .unwrap_or_default()
    }

    /// Number of bound bindings across the document. Bindings whose
    /// callback is still running are not counted.
    pub fn binding_count(&self) -> usize {
        self.inner
            .bindings
            .borrow()
            .values()
            .flatten()
            .filter(|record| record.state == BindingState::Bound)
            .count()
    }

    pub(crate) fn binding_state(&self, element: NodeId, id: BindingId) -> BindingState {
        self.inner
            .bindings
            .borrow()
            .get(&element)
            .and_then(|records| records.iter().find(|record| record.id == id))
            .map_or(BindingState::Unbound, |record| record.state)
    }

    /// Hand a resource to a binding.
    ///
    /// Returns `false`, after releasing the resource, if the binding is
    /// already gone.
    pub(crate) fn attach(&self, element: NodeId, id: BindingId, resource: Resource) -> bool {
        let rejected = {
            let mut bindings = self.inner.bindings.borrow_mut();
            let record = bindings
                .get_mut(&element)
                .and_then(|records| records.iter_mut().find(|record| record.id == id));
            match record {
                Some(record) => {
                    let resources = &mut record.resources;
                    match resource {
                        Resource::Watcher(watcher) => resources.watchers.push(watcher),
                        Resource::Listener(_, listener) => resources.listeners.push(listener),
                        Resource::Rendered(node) => resources.rendered.push(node),
                        Resource::Cleanup(cleanup) => resources.cleanups.push(cleanup),
                    }
                    None
                }
                None => Some(resource),
            }
        };

        let Some(resource) = rejected else {
            return true;
        };
        match resource {
            Resource::Watcher(watcher) => drop(watcher),
            Resource::Listener(node, listener) => {
                node.remove_event_listener(listener);
            }
            Resource::Rendered(node) => self.remove(&node),
            Resource::Cleanup(cleanup) => cleanup(),
        }
        false
    }

    /// Remove every node rendered by a binding.
    pub(crate) fn clear_rendered(&self, element: NodeId, id: BindingId) {
        let rendered = {
            let mut bindings = self.inner.bindings.borrow_mut();
            bindings
                .get_mut(&element)
                .and_then(|records| records.iter_mut().find(|record| record.id == id))
                .map(|record| std::mem::take(&mut record.resources.rendered))
                .unwrap_or_default()
        };
        for node in rendered {
            self.remove(&node);
        }
    }

    /// Insert `nodes` after `anchor` in order, give each its scope, record
    /// them on the binding and bind them.
    pub(crate) fn render(
        &self,
        element: NodeId,
        id: BindingId,
        anchor: &Node,
        nodes: Vec<(Node, Scope)>,
    ) {
        let mut after = anchor.clone();
        for (node, scope) in nodes {
            if !after.insert_after(&node) {
                tracing::warn!(anchor = %anchor.id(), "render anchor is detached");
                return;
            }
            self.set_scope(&node, scope);
            if !self.attach(element, id, Resource::Rendered(node.clone())) {
                return;
            }
            after = node.clone();

            let engine = self.clone();
            self.schedule(async move {
                if let Err(error) = engine.scan(&node).await {
                    tracing::warn!(node = %node.id(), %error, "binding rendered node failed");
                }
            });
        }
    }

    fn teardown_binding(&self, element: NodeId, id: BindingId) {
        let record = {
            let mut bindings = self.inner.bindings.borrow_mut();
            let Some(records) = bindings.get_mut(&element) else {
                return;
            };
            let Some(index) = records.iter().position(|record| record.id == id) else {
                return;
            };
            let record = records.remove(index);
            if records.is_empty() {
                bindings.remove(&element);
            }
            record
        };
        self.release(record);
    }

    /// Undo everything a binding set up. No engine borrow is held.
    fn release(&self, mut record: BindingRecord) {
        record.state = BindingState::Unbound;
        let resources = std::mem::take(&mut record.resources);
        let had_resources = !resources.is_empty();
        let Resources {
            watchers,
            listeners,
            rendered,
            cleanups,
        } = resources;

        for listener in listeners {
            record.element.remove_event_listener(listener);
        }
        drop(watchers);
        for node in rendered {
            self.remove(&node);
        }
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
        tracing::debug!(
            binding = %record.id,
            directive = %record.directive,
            had_resources,
            "binding unbound"
        );
    }

    /// Tear down every binding in the subtree under `node`, leaving the
    /// nodes in place. Returns the number of bindings torn down.
    pub fn unbind(&self, node: &Node) -> usize {
        let records: Vec<BindingRecord> = {
            let mut bindings = self.inner.bindings.borrow_mut();
            node.descendants()
                .iter()
                .filter_map(|n| bindings.remove(&n.id()))
                .flatten()
                .collect()
        };
        let count = records.len();
        for record in records {
            self.release(record);
        }
        count
    }

    /// Tear down every binding in the subtree under `node`, then detach it.
    pub fn remove(&self, node: &Node) {
        self.unbind(node);
        {
            let mut scopes = self.inner.scopes.borrow_mut();
            for n in node.descendants() {
                scopes.remove(&n.id());
            }
        }
        node.remove();
        tracing::trace!(node = %node.id(), "node removed");
    }

    // ------------------------------------------------------------------
    // Deferred work
    // ------------------------------------------------------------------

    /// Run `task` now if it completes without suspending, else queue it for
    /// [`settle`](Self::settle).
    pub fn schedule(&self, task: impl Future<Output = ()> + 'static) {
        let mut task = task.boxed_local();
        if (&mut task).now_or_never().is_some() {
            return;
        }
        self.inner.queue.borrow_mut().push(task);
    }

    /// Number of queued tasks.
    pub fn pending_count(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Drive queued tasks, including tasks they queue, to completion.
    ///
    /// Returns the number of tasks driven.
    pub async fn settle(&self) -> usize {
        let mut driven = 0;
        loop {
            let tasks = std::mem::take(&mut *self.inner.queue.borrow_mut());
            if tasks.is_empty() {
                break;
            }
            driven += tasks.len();
            join_all(tasks).await;
        }
        driven
    }
}

impl fmt::Debug for DirectiveEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveEngine")
            .field("directives", &self.directive_names())
            .field("bindings", &self.binding_count())
            .field("pending", &self.pending_count())
            .finish()
    }
}

fn default_sink(failure: &BindingFailure) {
    tracing::warn!(
        directive = %failure.directive,
        attribute = %failure.attribute,
        element = %failure.element,
        error = %failure.error,
        "directive binding failed"
    );
}

/// Globals available to every expression.
fn global_scope(store: &Store) -> Scope {
    let scope = Scope::new();
    let store = store.clone();
    scope.define(
        "signal",
        Value::Function(Function::native("signal", move |args| {
            let initial = args.first().cloned().unwrap_or_default();
            Ok(Value::Signal(store.create_signal(initial)))
        })),
    );
    scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{Argument, DirectivePattern};

    fn engine() -> DirectiveEngine {
        DirectiveEngine::new(Store::new(), DirectiveConfig::default())
    }

    /// A directive matching `x-mark` that counts its runs.
    fn counting(engine: &DirectiveEngine, runs: &Rc<Cell<usize>>) -> Directive {
        let pattern = DirectivePattern::new(engine.config(), "mark").build().unwrap();
        let runs = Rc::clone(runs);
        Directive::new(
            move |_: &MatcherContext<'_>| Some(pattern.clone()),
            move |_: DirectiveContext| {
                runs.set(runs.get() + 1);
                async { Ok::<_, DirectiveError>(()) }
            },
        )
    }

    #[test]
    fn duplicate_directive_fails() {
        let engine = engine();
        let runs = Rc::new(Cell::new(0));
        engine.register_directive("mark", counting(&engine, &runs)).unwrap();
        let err = engine
            .register_directive("mark", counting(&engine, &runs))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateDirective(name) if name == "mark"));
    }

    #[tokio::test]
    async fn rescan_does_not_duplicate_bindings() {
        let engine = engine();
        let runs = Rc::new(Cell::new(0));
        engine.register_directive("mark", counting(&engine, &runs)).unwrap();

        let el = Node::element("div").with_attribute("x-mark", "");
        let root = Node::element("main").with_child(el.clone());

        engine.scan(&root).await.unwrap();
        engine.scan(&root).await.unwrap();

        assert_eq!(runs.get(), 1);
        let bindings = engine.bindings_for(&el);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].state, BindingState::Bound);
        assert_eq!(bindings[0].attribute, "x-mark");
    }

    #[tokio::test]
    async fn declining_matcher_creates_no_binding() {
        let engine = engine();
        let pattern = DirectivePattern::new(engine.config(), "tip")
            .argument(Argument::Required)
            .build()
            .unwrap();
        engine
            .register_directive(
                "tip",
                Directive::new(
                    move |cx: &MatcherContext<'_>| (cx.element.tag_name().as_deref() == Some("p")).then(|| pattern.clone()),
                    |_: DirectiveContext| async { Ok::<_, DirectiveError>(()) },
                ),
            )
            .unwrap();

        let span = Node::element("span").with_attribute("x-tip:top", "");
        let p = Node::element("p").with_attribute("x-tip:top", "");
        let root = Node::element("main").with_child(span.clone()).with_child(p.clone());

        let report = engine.scan(&root).await.unwrap();
        assert!(engine.bindings_for(&span).is_empty());
        assert_eq!(engine.bindings_for(&p).len(), 1);
        assert_eq!(report.bound, 1);
    }

    #[tokio::test]
    async fn failing_callback_is_reported_and_isolated() {
        let engine = engine();
        let pattern = DirectivePattern::new(engine.config(), "boom").build().unwrap();
        engine
            .register_directive(
                "boom",
                Directive::new(
                    move |_: &MatcherContext<'_>| Some(pattern.clone()),
                    |cx: DirectiveContext| async move {
                        // Resources attached before failing are released
                        cx.on_cleanup(|| {});
                        Err::<(), _>(DirectiveError::Invalid("nope".into()))
                    },
                ),
            )
            .unwrap();
        let runs = Rc::new(Cell::new(0));
        engine.register_directive("mark", counting(&engine, &runs)).unwrap();

        let failures = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&failures);
        engine.on_error(move |failure| sink.borrow_mut().push(failure.clone()));

        let bad = Node::element("div").with_attribute("x-boom", "");
        let good = Node::element("div").with_attribute("x-mark", "");
        let root = Node::element("main").with_child(bad.clone()).with_child(good.clone());

        let report = engine.scan(&root).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(runs.get(), 1);
        assert!(engine.bindings_for(&bad).is_empty());
        assert_eq!(failures.borrow().len(), 1);
        assert_eq!(failures.borrow()[0].directive, "boom");
        assert_eq!(failures.borrow()[0].element, bad.id());
    }

    #[tokio::test]
    async fn binding_count_skips_running_callbacks() {
        let engine = engine();
        let pattern = DirectivePattern::new(engine.config(), "slow").build().unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let record = Rc::clone(&seen);
        engine
            .register_directive(
                "slow",
                Directive::new(
                    move |_: &MatcherContext<'_>| Some(pattern.clone()),
                    move |cx: DirectiveContext| {
                        let record = Rc::clone(&record);
                        async move {
                            let engine = cx.engine();
                            record
                                .borrow_mut()
                                .push((engine.binding_count(), cx.state()));
                            Ok::<_, DirectiveError>(())
                        }
                    },
                ),
            )
            .unwrap();

        let first = Node::element("div").with_attribute("x-slow", "");
        let second = Node::element("div").with_attribute("x-slow", "");
        let root = Node::element("main").with_child(first).with_child(second);
        engine.scan(&root).await.unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![(0, BindingState::Matched), (1, BindingState::Matched)]
        );
        assert_eq!(engine.binding_count(), 2);
    }

    #[tokio::test]
    async fn ignore_attribute_stops_descent() {
        let engine = engine();
        let runs = Rc::new(Cell::new(0));
        engine.register_directive("mark", counting(&engine, &runs)).unwrap();

        let root = Node::element("main")
            .with_child(Node::element("div").with_attribute("x-mark", ""))
            .with_child(
                Node::element("section")
                    .with_attribute("x-ignore", "")
                    .with_child(Node::element("div").with_attribute("x-mark", "")),
            );

        engine.scan(&root).await.unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[tokio::test]
    async fn priority_orders_directives_on_an_element() {
        let engine = engine();
        let order = Rc::new(RefCell::new(Vec::new()));
        for (name, priority) in [("late", 10), ("early", -10)] {
            let pattern = DirectivePattern::new(engine.config(), name).build().unwrap();
            let order = Rc::clone(&order);
            engine
                .register_directive(
                    name,
                    Directive::new(
                        move |_: &MatcherContext<'_>| Some(pattern.clone()),
                        move |_: DirectiveContext| {
                            order.borrow_mut().push(name);
                            async { Ok::<_, DirectiveError>(()) }
                        },
                    )
                    .with_priority(priority),
                )
                .unwrap();
        }

        let root = Node::element("div")
            .with_attribute("x-late", "")
            .with_attribute("x-early", "");
        engine.scan(&root).await.unwrap();
        assert_eq!(*order.borrow(), vec!["early", "late"]);
    }

    #[tokio::test]
    async fn scheduled_work_runs_now_or_on_settle() {
        let engine = engine();
        let done = Rc::new(Cell::new(0));

        let counter = Rc::clone(&done);
        engine.schedule(async move { counter.set(counter.get() + 1) });
        assert_eq!(done.get(), 1);
        assert_eq!(engine.pending_count(), 0);

        let counter = Rc::clone(&done);
        engine.schedule(async move {
            tokio::task::yield_now().await;
            counter.set(counter.get() + 1);
        });
        assert_eq!(engine.pending_count(), 1);

        assert_eq!(engine.settle().await, 1);
        assert_eq!(done.get(), 2);
    }
}
