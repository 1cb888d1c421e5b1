//! `x-bind:attr`: keep an attribute, the text content or the class list in
//! sync with an expression.

use crate::config::DirectiveConfig;
use crate::directive::{
    Argument, Directive, DirectiveContext, DirectiveError, DirectivePattern, MatcherContext,
};
use crate::dom::Node;
use crate::expr::Value;

/// Shorthand spellings owned by the template directives.
const TEMPLATE_SHORTHANDS: [&str; 2] = [":if", ":for"];

pub(super) fn directive(config: &DirectiveConfig) -> Result<Directive, regex::Error> {
    let pattern = DirectivePattern::new(config, "bind")
        .argument(Argument::Required)
        .shorthand_prefix(":")
        .shorthand_brackets()
        .build()?;
    Ok(Directive::new(
        move |cx: &MatcherContext<'_>| {
            if cx.is_template() && TEMPLATE_SHORTHANDS.contains(&cx.name) {
                return None;
            }
            Some(pattern.clone())
        },
        |cx: DirectiveContext| async move { bind(&cx) },
    ))
}

fn bind(cx: &DirectiveContext) -> Result<(), DirectiveError> {
    let Some(target) = cx.argument().map(str::to_string) else {
        return Err(DirectiveError::Invalid(format!(
            "`{}` names no attribute",
            cx.attribute()
        )));
    };
    let element = cx.element().clone();

    match target.as_str() {
        "text" => cx.watch_value(cx.expression(), move |value| {
            let text = display(&value);
            if element.text_content() != text {
                element.set_text_content(&text);
            }
        }),
        "class" => {
            let fixed = element.attribute("class").unwrap_or_default();
            cx.watch_value(cx.expression(), move |value| {
                let classes = class_list(&fixed, &value);
                if element.attribute("class").as_deref() != Some(classes.as_str()) {
                    element.set_attribute("class", &classes);
                }
            })
        }
        _ => cx.watch_value(cx.expression(), move |value| {
            write_attribute(&element, &target, &value)
        }),
    }
}

/// Text form of a bound value; nullish values render as nothing.
fn display(value: &Value) -> String {
    if value.is_nullish() {
        String::new()
    } else {
        value.to_string()
    }
}

fn write_attribute(element: &Node, name: &str, value: &Value) {
    let current = element.attribute(name);
    match value {
        Value::Undefined | Value::Null | Value::Bool(false) => {
            if current.is_some() {
                element.remove_attribute(name);
            }
        }
        Value::Bool(true) => {
            if current.is_none() {
                element.set_attribute(name, "");
            }
        }
        value => {
            let text = value.to_string();
            if current.as_deref() != Some(text.as_str()) {
                element.set_attribute(name, &text);
            }
        }
    }
}

/// Static classes followed by the dynamic ones, without repeats.
///
/// An object toggles each key by the truthiness of its value; an array or
/// string contributes its entries.
fn class_list(fixed: &str, value: &Value) -> String {
    let mut classes: Vec<String> = fixed.split_whitespace().map(str::to_string).collect();
    let mut add = |class: &str| {
        for class in class.split_whitespace() {
            if !classes.iter().any(|existing| existing == class) {
                classes.push(class.to_string());
            }
        }
    };

    match value {
        Value::Object(toggles) => {
            for (class, on) in toggles.borrow().iter() {
                if on.truthy() {
                    add(class);
                }
            }
        }
        Value::Array(items) => {
            for item in items.borrow().iter().filter(|item| item.truthy()) {
                add(&item.to_string());
            }
        }
        Value::String(text) => add(text),
        _ => {}
    }
    classes.join(" ")
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::directive::{BindingFailure, BindingState, DirectiveEngine};
    use crate::expr::EvalError;
    use crate::reactive::Store;

    /// Bind `root` with every failure collected instead of logged.
    async fn bound_with_failures(root: &Node) -> (DirectiveEngine, Rc<RefCell<Vec<BindingFailure>>>) {
        let engine = DirectiveEngine::with_builtins(Store::new(), DirectiveConfig::default()).unwrap();
        let failures = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&failures);
        engine.on_error(move |failure| sink.borrow_mut().push(failure.clone()));
        engine.scan(root).await.unwrap();
        (engine, failures)
    }

    async fn bound(root: &Node) -> DirectiveEngine {
        let engine = DirectiveEngine::with_builtins(Store::new(), DirectiveConfig::default()).unwrap();
        engine.scan(root).await.unwrap();
        engine
    }

    #[tokio::test]
    async fn all_spellings_bind_attributes() {
        let a = Node::element("a")
            .with_attribute("x-bind:href", "url")
            .with_attribute(":title", "'hello'")
            .with_attribute("[rel]", "1 + 1");
        let root = Node::element("div")
            .with_attribute("x-data", "{ url: '/home' }")
            .with_child(a.clone());
        let _engine = bound(&root).await;

        assert_eq!(a.attribute("href").as_deref(), Some("/home"));
        assert_eq!(a.attribute("title").as_deref(), Some("hello"));
        assert_eq!(a.attribute("rel").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn signal_updates_reach_the_attribute() {
        let input = Node::element("input").with_attribute(":disabled", "locked.value");
        let root = Node::element("div")
            .with_attribute("x-data", "{ locked: signal(true) }")
            .with_child(input.clone());
        let engine = bound(&root).await;
        assert_eq!(input.attribute("disabled").as_deref(), Some(""));

        let scope = engine.scope_for(&input);
        let locked = scope.lookup("locked").unwrap();
        locked.as_signal().unwrap().set(Value::Bool(false));
        assert_eq!(input.attribute("disabled"), None);
    }

    #[tokio::test]
    async fn text_and_class_targets() {
        let p = Node::element("p")
            .with_attribute("class", "card")
            .with_attribute(":text", "name")
            .with_attribute(":class", "{ active: on, hidden: !on }");
        let root = Node::element("div")
            .with_attribute("x-data", "{ name: 'Ada', on: true }")
            .with_child(p.clone());
        let _engine = bound(&root).await;

        assert_eq!(p.text_content(), "Ada");
        assert_eq!(p.attribute("class").as_deref(), Some("card active"));
    }

    #[tokio::test]
    async fn failing_first_evaluation_leaves_no_attribute() {
        let a = Node::element("a").with_attribute(":title", "missing.length");
        let root = Node::element("div").with_child(a.clone());
        let (engine, failures) = bound_with_failures(&root).await;

        assert_eq!(a.attribute("title"), None);
        assert!(engine.bindings_for(&a).is_empty());
        assert_eq!(engine.binding_count(), 0);

        let failures = failures.borrow();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].directive, "bind");
        assert_eq!(failures[0].attribute, ":title");
        assert_eq!(failures[0].element, a.id());
        assert!(matches!(
            &failures[0].error,
            DirectiveError::Eval { source: EvalError::UndefinedVariable(name), .. } if name == "missing"
        ));
    }

    #[tokio::test]
    async fn failing_reevaluation_keeps_the_last_value() {
        let a = Node::element("a").with_attribute(":title", "user.value.name");
        let root = Node::element("div")
            .with_attribute("x-data", "{ user: signal({ name: 'Ada' }) }")
            .with_child(a.clone());
        let (engine, failures) = bound_with_failures(&root).await;
        assert_eq!(a.attribute("title").as_deref(), Some("Ada"));
        assert!(failures.borrow().is_empty());

        let user = engine.scope_for(&a).lookup("user").unwrap();
        let user = user.as_signal().unwrap().clone();
        user.set(Value::Null);

        assert_eq!(a.attribute("title").as_deref(), Some("Ada"));
        assert_eq!(failures.borrow().len(), 1);
        assert!(matches!(
            &failures.borrow()[0].error,
            DirectiveError::Eval { source: EvalError::NullishAccess { .. }, .. }
        ));
        let bindings = engine.bindings_for(&a);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].state, BindingState::Bound);

        // Still watching after the failure
        user.set(Value::from_json(&serde_json::json!({ "name": "Grace" })));
        assert_eq!(a.attribute("title").as_deref(), Some("Grace"));
        assert_eq!(failures.borrow().len(), 1);
    }

    #[test]
    fn class_list_merges_without_repeats() {
        let value = Value::array(vec![Value::from("a"), Value::from("b c"), Value::from("")]);
        assert_eq!(class_list("a x", &value), "a x b c");
        assert_eq!(class_list("", &Value::Null), "");
    }
}
