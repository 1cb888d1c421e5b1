//! Runtime configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub directives: DirectiveConfig,
    pub signals: SignalConfig,
}

impl Config {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.directives.validate()
    }
}

/// Attribute naming convention used by the built-in directive matchers.
///
/// With the defaults, `x-bind:title`, `:title` and `[title]` all bind the
/// `title` attribute, and `x-on:click` / `@click` listen for clicks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectiveConfig {
    /// Prefix every long-form directive attribute starts with.
    pub prefix: String,
    /// Separator between a directive name and its argument.
    pub separator: String,
    /// Accept the `:arg`, `[arg]` and `@event` shorthand forms.
    pub shorthand: bool,
    /// Directive name whose presence stops descent into an element.
    pub ignore: String,
}

impl DirectiveConfig {
    /// Full attribute name for a directive, e.g. `x-bind`.
    pub fn attribute(&self, directive: &str) -> String {
        format!("{}{}", self.prefix, directive)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() {
            return Err(ConfigError::Invalid("directive prefix must not be empty".into()));
        }
        if self.separator.is_empty() {
            return Err(ConfigError::Invalid("directive separator must not be empty".into()));
        }
        if self.prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!(
                "directive prefix {:?} contains whitespace",
                self.prefix
            )));
        }
        Ok(())
    }
}

impl Default for DirectiveConfig {
    fn default() -> Self {
        Self {
            prefix: "x-".into(),
            separator: ":".into(),
            shorthand: true,
            ignore: "ignore".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Upper bound on watcher runs per notification flush.
    pub max_flush_iterations: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            max_flush_iterations: 10_000,
        }
    }
}
