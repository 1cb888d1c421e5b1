//! `x-on:event`: run a handler expression when the element receives an
//! event.
//!
//! Modifiers follow the event name: `@submit.prevent` calls
//! `preventDefault`, `@click.stop` stops propagation. The handler scope
//! adds `$event` and `$el`. A handler that evaluates to a function is
//! called with the event, so both `count.value++` and
//! `() => count.value++` work.

use std::rc::Rc;

use crate::config::DirectiveConfig;
use crate::directive::{
    Argument, Directive, DirectiveContext, DirectiveError, DirectivePattern, MatcherContext,
};
use crate::dom::Event;
use crate::expr::{EvalError, Evaluator, Expr, Scope, Value};
use crate::reactive::Store;

#[derive(Debug, Default, Clone, Copy)]
struct Modifiers {
    prevent: bool,
    stop: bool,
}

pub(super) fn directive(config: &DirectiveConfig) -> Result<Directive, regex::Error> {
    let pattern = DirectivePattern::new(config, "on")
        .argument(Argument::Required)
        .shorthand_prefix("@")
        .build()?;
    Ok(Directive::new(
        move |_: &MatcherContext<'_>| Some(pattern.clone()),
        |cx: DirectiveContext| async move { listen(&cx) },
    ))
}

fn listen(cx: &DirectiveContext) -> Result<(), DirectiveError> {
    let argument = cx.argument().unwrap_or_default();
    let mut parts = argument.split('.');
    let event_type = parts.next().unwrap_or_default().to_string();
    if event_type.is_empty() {
        return Err(DirectiveError::Invalid(format!(
            "`{}` names no event",
            cx.attribute()
        )));
    }

    let mut modifiers = Modifiers::default();
    for modifier in parts {
        match modifier {
            "prevent" => modifiers.prevent = true,
            "stop" => modifiers.stop = true,
            other => tracing::debug!(modifier = other, event = %event_type, "unknown event modifier"),
        }
    }

    let expr = cx.compile(cx.expression())?;
    let scope = cx.data().clone();
    let store = cx.store().clone();
    let expression = cx.expression().to_string();
    let handle = cx.handle();

    cx.listen(&event_type, move |event| {
        if modifiers.prevent {
            event.prevent_default();
        }
        if modifiers.stop {
            event.stop_propagation();
        }
        if let Err(source) = run_handler(&store, &expr, &scope, event) {
            handle.report(DirectiveError::Eval {
                expression: expression.clone(),
                source,
            });
        }
    });
    Ok(())
}

fn run_handler(
    store: &Store,
    expr: &Rc<Expr>,
    scope: &Scope,
    event: &Event,
) -> Result<(), EvalError> {
    let scope = scope.child();
    scope.define("$event", Value::Event(event.clone()));
    if let Some(target) = event.current_target() {
        scope.define("$el", Value::Element(target));
    }

    store.batch(|| -> Result<(), EvalError> {
        let evaluator = Evaluator::untracked();
        if let Value::Function(handler) = evaluator.eval(expr, &scope)? {
            evaluator.call(&handler, &[Value::Event(event.clone())])?;
        }
        Ok(())
    })
}
