//! Pluggable message classification strategies.

pub mod json;
pub mod plain_text;

pub use json::JsonParser;
pub use plain_text::PlainTextParser;

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConfigError, ParseError};
use crate::message::MailMessage;

/// A classification/extraction routine applied to each fetched message.
///
/// The processor only observes success or failure; whatever a strategy
/// emits (stdout, JSON, downstream side effects) is its own business.
/// Returning [`ParseError::Unparseable`] quarantines the message.
///
/// `Send + Sync` because the sweep runs on a blocking worker thread.
pub trait ParserStrategy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn parse(&self, msg: &MailMessage) -> Result<(), ParseError>;
}

type StrategyCtor = fn() -> Box<dyn ParserStrategy>;

/// Registry of parser strategies, keyed by name.
///
/// Populated with the built-ins at startup; the `parser_strategy`
/// configuration key is resolved against it exactly once, before any
/// mailbox session opens. An unknown name is a configuration error.
pub struct ParserRegistry {
    strategies: HashMap<&'static str, StrategyCtor>,
}

impl ParserRegistry {
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            strategies: HashMap::new(),
        };
        registry.register("plain_text", || Box::new(PlainTextParser));
        registry.register("json", || Box::new(JsonParser));
        registry
    }

    pub fn register(&mut self, name: &'static str, ctor: StrategyCtor) {
        self.strategies.insert(name, ctor);
        debug!(strategy = name, "Registered parser strategy");
    }

    pub fn resolve(&self, name: &str) -> Result<Box<dyn ParserStrategy>, ConfigError> {
        self.strategies
            .get(name)
            .map(|ctor| ctor())
            .ok_or_else(|| ConfigError::UnknownStrategy {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.strategies.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve_by_name() {
        let registry = ParserRegistry::with_builtins();
        assert_eq!(registry.resolve("plain_text").unwrap().name(), "plain_text");
        assert_eq!(registry.resolve("json").unwrap().name(), "json");
    }

    #[test]
    fn unknown_strategy_is_config_error() {
        let registry = ParserRegistry::with_builtins();
        let err = registry.resolve("does_not_exist").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownStrategy { ref name, .. } if name == "does_not_exist"
        ));
        // The message lists what would have worked.
        assert!(err.to_string().contains("plain_text"));
    }

    #[test]
    fn names_are_sorted() {
        let registry = ParserRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["json", "plain_text"]);
    }

    #[test]
    fn custom_registration_resolves() {
        #[derive(Debug)]
        struct Noop;
        impl ParserStrategy for Noop {
            fn name(&self) -> &str {
                "noop"
            }
            fn parse(&self, _msg: &MailMessage) -> Result<(), ParseError> {
                Ok(())
            }
        }

        let mut registry = ParserRegistry::with_builtins();
        registry.register("noop", || Box::new(Noop));
        assert_eq!(registry.resolve("noop").unwrap().name(), "noop");
    }
}
