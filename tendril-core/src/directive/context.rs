//! What a directive callback sees.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::binding::{BindingId, BindingState};
use super::engine::{BindingFailure, DirectiveEngine, DirectiveError, Resource, WeakEngine};
use super::matcher::Matches;
use crate::dom::{Event, ListenerId, Node, NodeId};
use crate::expr::{EvalError, Evaluator, Expr, Scope, Value};
use crate::reactive::{Store, Tracker};

/// Context for one binding, handed to its directive callback.
///
/// Everything set up through the context (watchers, listeners, scopes,
/// cleanups) belongs to the binding and is undone when it is torn down.
pub struct DirectiveContext {
    pub(super) engine: DirectiveEngine,
    pub(super) binding: BindingId,
    pub(super) directive: Rc<str>,
    pub(super) element: Node,
    pub(super) attribute: String,
    pub(super) expression: String,
    pub(super) matches: Matches,
    pub(super) scope: Scope,
}

impl DirectiveContext {
    pub fn element(&self) -> &Node {
        &self.element
    }

    /// Name of the matched attribute.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// The attribute value.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn matches(&self) -> &Matches {
        &self.matches
    }

    /// First participating capture group, e.g. `title` in `:title`.
    pub fn argument(&self) -> Option<&str> {
        self.matches.argument()
    }

    /// The element's data scope.
    pub fn data(&self) -> &Scope {
        &self.scope
    }

    pub fn store(&self) -> &Store {
        self.engine.store()
    }

    pub fn engine(&self) -> &DirectiveEngine {
        &self.engine
    }

    pub fn binding(&self) -> BindingId {
        self.binding
    }

    pub fn state(&self) -> BindingState {
        self.engine.binding_state(self.element.id(), self.binding)
    }

    /// A handle that outlives the callback, for watchers and listeners.
    pub fn handle(&self) -> BindingHandle {
        BindingHandle {
            engine: self.engine.downgrade(),
            element: self.element.id(),
            binding: self.binding,
            directive: Rc::clone(&self.directive),
            attribute: self.attribute.as_str().into(),
        }
    }

    /// Compile `source` through the engine's expression cache.
    pub fn compile(&self, source: &str) -> Result<Rc<Expr>, DirectiveError> {
        self.engine
            .cache()
            .compile(source)
            .map_err(|source_error| DirectiveError::Parse {
                expression: source.to_string(),
                source: source_error,
            })
    }

    /// Evaluate the attribute value against the element scope.
    pub fn evaluate(&self, tracker: Option<&Tracker>) -> Result<Value, DirectiveError> {
        let expr = self.compile(&self.expression)?;
        Evaluator::new(tracker)
            .eval(&expr, &self.scope)
            .map_err(|source| DirectiveError::Eval {
                expression: self.expression.clone(),
                source,
            })
    }

    /// Watch `source`: evaluate it tracked now and whenever a signal it read
    /// changes, passing each result to `apply`.
    ///
    /// A result that is itself a signal is read through, so binding `x`
    /// behaves like binding `x.value`. A failure on the first evaluation
    /// fails the call; later failures are reported to the error sink and
    /// leave the last applied value in place.
    pub fn watch_value(
        &self,
        source: &str,
        apply: impl Fn(Value) + 'static,
    ) -> Result<(), DirectiveError> {
        let expr = self.compile(source)?;
        let scope = self.scope.clone();
        let expression = source.to_string();
        let handle = self.handle();

        let first_run = Rc::new(Cell::new(true));
        let initial_error = Rc::new(RefCell::new(None));

        let watcher = {
            let first_run = Rc::clone(&first_run);
            let initial_error = Rc::clone(&initial_error);
            self.store().watch(
                move |tracker| evaluate_through_signals(&expr, &scope, tracker),
                move |result: Result<Value, EvalError>| match result {
                    Ok(value) => apply(value),
                    Err(source) => {
                        let error = DirectiveError::Eval {
                            expression: expression.clone(),
                            source,
                        };
                        if first_run.get() {
                            *initial_error.borrow_mut() = Some(error);
                        } else {
                            handle.report(error);
                        }
                    }
                },
            )?
        };
        first_run.set(false);

        let failed = initial_error.borrow_mut().take();
        if let Some(error) = failed {
            drop(watcher);
            return Err(error);
        }
        self.attach(Resource::Watcher(watcher));
        Ok(())
    }

    /// Add an event listener to the element for the binding's lifetime.
    pub fn listen(&self, event_type: &str, handler: impl Fn(&Event) + 'static) -> ListenerId {
        let id = self.element.add_event_listener(event_type, handler);
        self.attach(Resource::Listener(self.element.clone(), id));
        id
    }

    /// Scope the element's subtree with `scope` for the binding's lifetime.
    pub fn set_scope(&self, scope: Scope) {
        let previous = self.engine.replace_scope(&self.element, scope.clone());
        let engine = self.engine.downgrade();
        let node = self.element.id();
        self.on_cleanup(move || {
            if let Some(engine) = engine.upgrade() {
                engine.restore_scope(node, &scope, previous);
            }
        });
    }

    /// Run `cleanup` when the binding is torn down.
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + 'static) {
        self.attach(Resource::Cleanup(Box::new(cleanup)));
    }

    fn attach(&self, resource: Resource) -> bool {
        self.engine
            .attach(self.element.id(), self.binding, resource)
    }
}

impl fmt::Debug for DirectiveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveContext")
            .field("directive", &self.directive)
            .field("element", &self.element.id())
            .field("attribute", &self.attribute)
            .field("binding", &self.binding)
            .finish()
    }
}

fn evaluate_through_signals(expr: &Expr, scope: &Scope, tracker: &Tracker) -> Result<Value, EvalError> {
    let evaluator = Evaluator::tracked(tracker);
    Ok(match evaluator.eval(expr, scope)? {
        Value::Signal(signal) => evaluator.read_signal(&signal),
        value => value,
    })
}

/// Non-owning handle to a binding, usable after its callback returned.
#[derive(Clone)]
pub struct BindingHandle {
    engine: WeakEngine,
    element: NodeId,
    binding: BindingId,
    directive: Rc<str>,
    attribute: Rc<str>,
}

impl BindingHandle {
    pub fn id(&self) -> BindingId {
        self.binding
    }

    pub fn state(&self) -> BindingState {
        self.engine
            .upgrade()
            .map_or(BindingState::Unbound, |engine| {
                engine.binding_state(self.element, self.binding)
            })
    }

    /// Report a failure of this binding to the engine's error sink.
    pub fn report(&self, error: DirectiveError) {
        if let Some(engine) = self.engine.upgrade() {
            engine.report(BindingFailure {
                directive: self.directive.to_string(),
                attribute: self.attribute.to_string(),
                element: self.element,
                error,
            });
        }
    }

    /// Insert `nodes` after `anchor`, each with its scope, and bind them.
    /// They are removed with the binding.
    pub fn render(&self, anchor: &Node, nodes: Vec<(Node, Scope)>) {
        if let Some(engine) = self.engine.upgrade() {
            engine.render(self.element, self.binding, anchor, nodes);
        }
    }

    /// Remove everything this binding rendered.
    pub fn clear_rendered(&self) {
        if let Some(engine) = self.engine.upgrade() {
            engine.clear_rendered(self.element, self.binding);
        }
    }
}

impl fmt::Debug for BindingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingHandle")
            .field("binding", &self.binding)
            .field("directive", &self.directive)
            .finish()
    }
}
