//! `x-if` and `x-for`: render a `<template>`'s content after it.
//!
//! The template stays in the document as the anchor. Rendered clones are
//! owned by the binding: each re-render removes the previous clones, and
//! tearing the binding down removes the current ones.

use std::cell::Cell;
use std::rc::Rc;

use regex::Regex;

use crate::config::DirectiveConfig;
use crate::directive::{
    BindingHandle, Directive, DirectiveContext, DirectiveError, DirectivePattern, MatcherContext,
};
use crate::dom::Node;
use crate::expr::{Scope, Value};

/// Largest number a numeric loop source may count up to.
const MAX_LOOP_COUNT: f64 = 10_000.0;

pub(super) fn conditional(config: &DirectiveConfig) -> Result<Directive, regex::Error> {
    let pattern = DirectivePattern::new(config, "if")
        .shorthand_exact(":if")
        .build()?;
    Ok(Directive::new(
        move |cx: &MatcherContext<'_>| cx.is_template().then(|| pattern.clone()),
        |cx: DirectiveContext| async move { render_when(&cx) },
    ))
}

fn render_when(cx: &DirectiveContext) -> Result<(), DirectiveError> {
    let template = cx.element().clone();
    let scope = cx.data().clone();
    let handle = cx.handle();
    let shown = Cell::new(None);

    cx.watch_value(cx.expression(), move |value| {
        let show = value.truthy();
        if shown.replace(Some(show)) == Some(show) {
            return;
        }
        handle.clear_rendered();
        if show {
            let nodes = content(&template)
                .into_iter()
                .map(|node| (node, scope.clone()))
                .collect();
            handle.render(&template, nodes);
        }
    })
}

/// Loop header of `x-for`: `item in items` or `(item, index) in items`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LoopHeader {
    item: String,
    index: Option<String>,
    source: String,
}

fn loop_syntax() -> Result<Regex, regex::Error> {
    Regex::new(
        r"^\s*(?:\(\s*([A-Za-z_$][\w$]*)\s*(?:,\s*([A-Za-z_$][\w$]*)\s*)?\)|([A-Za-z_$][\w$]*))\s+(?:in|of)\s+(.+?)\s*$",
    )
}

fn parse_header(syntax: &Regex, expression: &str) -> Option<LoopHeader> {
    let captures = syntax.captures(expression)?;
    let item = captures.get(1).or_else(|| captures.get(3))?.as_str().to_string();
    Some(LoopHeader {
        item,
        index: captures.get(2).map(|m| m.as_str().to_string()),
        source: captures.get(4)?.as_str().to_string(),
    })
}

pub(super) fn each(config: &DirectiveConfig) -> Result<Directive, regex::Error> {
    let pattern = DirectivePattern::new(config, "for")
        .shorthand_exact(":for")
        .build()?;
    let syntax = Rc::new(loop_syntax()?);
    Ok(Directive::new(
        move |cx: &MatcherContext<'_>| cx.is_template().then(|| pattern.clone()),
        move |cx: DirectiveContext| {
            let syntax = Rc::clone(&syntax);
            async move { render_each(&cx, &syntax) }
        },
    ))
}

fn render_each(cx: &DirectiveContext, syntax: &Regex) -> Result<(), DirectiveError> {
    let Some(header) = parse_header(syntax, cx.expression()) else {
        return Err(DirectiveError::Invalid(format!(
            "expected `item in items`, got `{}`",
            cx.expression()
        )));
    };
    let template = cx.element().clone();
    let scope = cx.data().clone();
    let handle = cx.handle();
    let source = header.source.clone();

    cx.watch_value(&source, move |value| {
        handle.clear_rendered();
        match items(&value) {
            Ok(items) => render_items(&handle, &template, &scope, &header, items),
            Err(error) => handle.report(error),
        }
    })
}

fn render_items(
    handle: &BindingHandle,
    template: &Node,
    scope: &Scope,
    header: &LoopHeader,
    items: Vec<Value>,
) {
    let mut nodes = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        let item_scope = scope.child();
        item_scope.define(header.item.as_str(), item);
        if let Some(name) = &header.index {
            item_scope.define(name.as_str(), Value::Number(index as f64));
        }
        nodes.extend(content(template).into_iter().map(|node| (node, item_scope.clone())));
    }
    tracing::trace!(template = %template.id(), nodes = nodes.len(), "rendering loop");
    handle.render(template, nodes);
}

/// What a loop source iterates over.
fn items(value: &Value) -> Result<Vec<Value>, DirectiveError> {
    Ok(match value {
        Value::Undefined | Value::Null => Vec::new(),
        Value::Array(items) => items.borrow().clone(),
        Value::Object(entries) => entries.borrow().values().cloned().collect(),
        Value::String(text) => text.chars().map(|c| Value::from(c.to_string())).collect(),
        Value::Number(n) if *n > MAX_LOOP_COUNT => {
            return Err(DirectiveError::Invalid(format!(
                "cannot count to {value}, loops stop at {MAX_LOOP_COUNT}"
            )))
        }
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => {
            (1..=*n as u64).map(|i| Value::Number(i as f64)).collect()
        }
        other => {
            return Err(DirectiveError::Invalid(format!(
                "cannot iterate over {}",
                other.type_name()
            )))
        }
    })
}

/// Fresh copies of a template's children.
fn content(template: &Node) -> Vec<Node> {
    template.children().iter().map(Node::deep_clone).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::DirectiveEngine;
    use crate::reactive::Store;

    fn engine() -> DirectiveEngine {
        DirectiveEngine::with_builtins(Store::new(), DirectiveConfig::default()).unwrap()
    }

    fn texts(parent: &Node) -> Vec<String> {
        parent
            .children()
            .iter()
            .filter(|n| !n.is_template())
            .map(Node::text_content)
            .collect()
    }

    #[test]
    fn loop_headers() {
        let syntax = loop_syntax().unwrap();
        let simple = parse_header(&syntax, "todo in todos").unwrap();
        assert_eq!(simple.item, "todo");
        assert_eq!(simple.index, None);
        assert_eq!(simple.source, "todos");

        let indexed = parse_header(&syntax, " (row, i) of table.rows ").unwrap();
        assert_eq!(indexed.item, "row");
        assert_eq!(indexed.index.as_deref(), Some("i"));
        assert_eq!(indexed.source, "table.rows");

        assert!(parse_header(&syntax, "todos").is_none());
    }

    #[tokio::test]
    async fn conditional_renders_and_removes() {
        let engine = engine();
        let template = Node::element("template")
            .with_attribute(":if", "open.value")
            .with_child(Node::element("p").with_attribute(":text", "'shown'"));
        let root = Node::element("div")
            .with_attribute("x-data", "{ open: signal(false) }")
            .with_child(template.clone());
        engine.scan(&root).await.unwrap();
        assert!(texts(&root).is_empty());

        let open = engine.scope_for(&template).lookup("open").unwrap();
        let open = open.as_signal().unwrap().clone();

        open.set(Value::Bool(true));
        assert_eq!(texts(&root), vec!["shown"]);
        // Same truthiness keeps the rendered nodes
        let rendered = root.children()[1].clone();
        open.set(Value::from(1));
        assert!(root.children()[1].ptr_eq(&rendered));

        open.set(Value::Bool(false));
        assert!(texts(&root).is_empty());
    }

    #[tokio::test]
    async fn loop_renders_each_item_with_its_scope() {
        let engine = engine();
        let template = Node::element("template")
            .with_attribute("x-for", "(name, i) in names.value")
            .with_child(Node::element("li").with_attribute(":text", "i + ':' + name"));
        let list = Node::element("ul")
            .with_attribute("x-data", "{ names: signal(['a', 'b']) }")
            .with_child(template.clone());
        engine.scan(&list).await.unwrap();
        assert_eq!(texts(&list), vec!["0:a", "1:b"]);

        let names = engine.scope_for(&template).lookup("names").unwrap();
        names
            .as_signal()
            .unwrap()
            .set(Value::array(vec![Value::from("c")]));
        assert_eq!(texts(&list), vec!["0:c"]);

        // Tearing the loop down removes its clones and their bindings
        let before = engine.binding_count();
        engine.unbind(&template);
        assert!(texts(&list).is_empty());
        assert!(engine.binding_count() < before);
    }

    #[test]
    fn iterable_sources() {
        let count = |value: Value| items(&value).unwrap().len();
        assert_eq!(count(Value::Null), 0);
        assert_eq!(count(Value::from(3)), 3);
        assert_eq!(count(Value::from("ab")), 2);
        assert_eq!(count(Value::from(10_000)), 10_000);
        assert!(items(&Value::Bool(true)).is_err());
        assert!(matches!(items(&Value::Number(1e12)), Err(DirectiveError::Invalid(_))));
    }

    #[tokio::test]
    async fn oversized_count_is_reported_not_rendered() {
        let engine = engine();
        let failures = Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = Rc::clone(&failures);
        engine.on_error(move |failure| sink.borrow_mut().push(failure.clone()));

        let template = Node::element("template")
            .with_attribute("x-for", "n in 1e12")
            .with_child(Node::element("li"));
        let list = Node::element("ul").with_child(template.clone());
        engine.scan(&list).await.unwrap();

        assert_eq!(list.children().len(), 1);
        assert_eq!(failures.borrow().len(), 1);
        assert_eq!(failures.borrow()[0].element, template.id());
        assert!(matches!(failures.borrow()[0].error, DirectiveError::Invalid(_)));
    }
}
