//! Attribute matching.
//!
//! A directive's matcher looks at one element/attribute pair and either
//! declines (`None`) or returns a pattern. The engine applies the pattern to
//! the attribute name and, if it matches, hands the capture groups to the
//! directive callback.

use regex::{Captures, Regex};

use crate::config::DirectiveConfig;
use crate::dom::Node;

/// The element/attribute pair a matcher is asked about.
#[derive(Debug, Clone, Copy)]
pub struct MatcherContext<'a> {
    pub element: &'a Node,
    /// Attribute name, e.g. `x-bind:title`.
    pub name: &'a str,
    /// Attribute value: the expression source.
    pub value: &'a str,
    pub config: &'a DirectiveConfig,
}

impl MatcherContext<'_> {
    pub fn is_template(&self) -> bool {
        self.element.is_template()
    }
}

/// Capture groups of a matched attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Matches {
    groups: Vec<Option<String>>,
}

impl Matches {
    pub(crate) fn from_captures(captures: &Captures<'_>) -> Self {
        Self {
            groups: captures
                .iter()
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect(),
        }
    }

    /// The whole matched attribute name.
    pub fn full(&self) -> &str {
        self.get(0).unwrap_or_default()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.groups.get(index)?.as_deref()
    }

    /// First capture group that participated in the match.
    ///
    /// Alternative spellings of one directive (`x-bind:title`, `:title`,
    /// `[title]`) each capture the argument in a different group.
    pub fn argument(&self) -> Option<&str> {
        self.groups.iter().skip(1).find_map(Option::as_deref)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Whether a long-form directive attribute carries an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Argument {
    /// `x-data`
    None,
    /// `x-bind:title`
    Required,
}

/// Builds the attribute-name pattern of a directive from the configured
/// naming convention.
#[derive(Debug, Clone)]
pub struct DirectivePattern<'a> {
    config: &'a DirectiveConfig,
    name: String,
    argument: Argument,
    shorthands: Vec<String>,
}

impl<'a> DirectivePattern<'a> {
    pub fn new(config: &'a DirectiveConfig, name: &str) -> Self {
        Self {
            config,
            name: name.to_string(),
            argument: Argument::None,
            shorthands: Vec::new(),
        }
    }

    pub fn argument(mut self, argument: Argument) -> Self {
        self.argument = argument;
        self
    }

    /// Accept `<prefix><argument>`, e.g. `:title` or `@click`.
    pub fn shorthand_prefix(mut self, prefix: &str) -> Self {
        self.shorthands
            .push(format!("{}(.+)", regex::escape(prefix)));
        self
    }

    /// Accept `[argument]`.
    pub fn shorthand_brackets(mut self) -> Self {
        self.shorthands.push(r"\[(.+)\]".to_string());
        self
    }

    /// Accept one fixed spelling, e.g. `:if`.
    pub fn shorthand_exact(mut self, spelling: &str) -> Self {
        self.shorthands.push(regex::escape(spelling));
        self
    }

    pub fn build(self) -> Result<Regex, regex::Error> {
        let long = regex::escape(&self.config.attribute(&self.name));
        let mut alternatives = vec![match self.argument {
            Argument::None => long,
            Argument::Required => {
                format!("{long}{}(.+)", regex::escape(&self.config.separator))
            }
        }];
        if self.config.shorthand {
            alternatives.extend(self.shorthands);
        }
        Regex::new(&format!("^(?:{})$", alternatives.join("|")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argument_of(pattern: &Regex, name: &str) -> Option<String> {
        let captures = pattern.captures(name)?;
        Matches::from_captures(&captures).argument().map(str::to_string)
    }

    #[test]
    fn long_and_short_forms() {
        let config = DirectiveConfig::default();
        let bind = DirectivePattern::new(&config, "bind")
            .argument(Argument::Required)
            .shorthand_prefix(":")
            .shorthand_brackets()
            .build()
            .unwrap();

        assert_eq!(argument_of(&bind, "x-bind:title").as_deref(), Some("title"));
        assert_eq!(argument_of(&bind, ":title").as_deref(), Some("title"));
        assert_eq!(argument_of(&bind, "[title]").as_deref(), Some("title"));
        assert!(!bind.is_match("x-bind"));
        assert!(!bind.is_match("title"));
    }

    #[test]
    fn shorthand_can_be_disabled() {
        let config = DirectiveConfig {
            prefix: "data-".into(),
            shorthand: false,
            ..DirectiveConfig::default()
        };
        let on = DirectivePattern::new(&config, "on")
            .argument(Argument::Required)
            .shorthand_prefix("@")
            .build()
            .unwrap();

        assert_eq!(argument_of(&on, "data-on:click").as_deref(), Some("click"));
        assert!(!on.is_match("@click"));
        assert!(!on.is_match("x-on:click"));
    }

    #[test]
    fn exact_names() {
        let config = DirectiveConfig::default();
        let data = DirectivePattern::new(&config, "data").build().unwrap();
        assert!(data.is_match("x-data"));
        assert!(!data.is_match("x-data:extra"));

        let when = DirectivePattern::new(&config, "if")
            .shorthand_exact(":if")
            .build()
            .unwrap();
        assert!(when.is_match(":if"));
        assert!(when.is_match("x-if"));
        assert!(!when.is_match(":iff"));
    }
}
