//! `x-data`: evaluate an object literal and scope the element's subtree
//! with its entries.

use indexmap::IndexMap;

use super::DATA_PRIORITY;
use crate::config::DirectiveConfig;
use crate::directive::{Directive, DirectiveContext, DirectiveError, DirectivePattern, MatcherContext};
use crate::expr::Value;

pub(super) fn directive(config: &DirectiveConfig) -> Result<Directive, regex::Error> {
    let pattern = DirectivePattern::new(config, "data").build()?;
    Ok(Directive::new(
        move |_: &MatcherContext<'_>| Some(pattern.clone()),
        |cx: DirectiveContext| async move { scope_element(&cx) },
    )
    .with_priority(DATA_PRIORITY)
    .scoping())
}

fn scope_element(cx: &DirectiveContext) -> Result<(), DirectiveError> {
    let entries = if cx.expression().trim().is_empty() {
        IndexMap::new()
    } else {
        match cx.evaluate(None)? {
            Value::Object(map) => map.borrow().clone(),
            Value::Undefined | Value::Null => IndexMap::new(),
            other => {
                return Err(DirectiveError::Invalid(format!(
                    "data must be an object, got {}",
                    other.type_name()
                )))
            }
        }
    };

    let scope = cx.data().child_with(entries);
    scope.define("$el", Value::Element(cx.element().clone()));
    cx.set_scope(scope);
    Ok(())
}
