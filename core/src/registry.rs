//! Handler registry (C6): topic → handler map with a default fallback.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::handler::Handler;

/// Maps topics to handlers, with an optional default handler used when a
/// topic has no specific binding.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
    default: Option<Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler to a topic, replacing any prior binding.
    pub fn register(&mut self, topic: impl Into<String>, handler: Handler) {
        self.handlers.insert(topic.into(), handler);
    }

    /// Bind many topic → handler pairs at once.
    pub fn register_many(&mut self, handlers: impl IntoIterator<Item = (String, Handler)>) {
        for (topic, handler) in handlers {
            self.handlers.insert(topic, handler);
        }
    }

    /// Set the fallback handler used for topics with no specific binding.
    pub fn set_default(&mut self, handler: Handler) {
        self.default = Some(handler);
    }

    /// Look up the handler for `topic`: exact match wins, else the default,
    /// else [`Error::NoHandler`].
    pub fn get(&self, topic: &str) -> Result<Handler> {
        self.handlers
            .get(topic)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| Error::no_handler(topic))
    }

    /// Every topic → handler binding registered so far (excludes the default).
    pub fn all(&self) -> &HashMap<String, Handler> {
        &self.handlers
    }

    /// The topics with a specific (non-default) binding.
    pub fn topics(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exact_match_wins_over_default() {
        let mut registry = HandlerRegistry::new();
        registry.register("t1", Handler::sync(|_, _, _| true));
        registry.set_default(Handler::sync(|_, _, _| false));

        assert!(matches!(registry.get("t1").unwrap(), Handler::Sync(_)));
        assert!(registry.get("t2").is_ok());
    }

    #[test]
    fn missing_topic_without_default_is_no_handler_error() {
        let registry = HandlerRegistry::new();
        let err = registry.get("unbound").unwrap_err();
        assert!(matches!(err, Error::NoHandler(topic) if topic == "unbound"));
    }

    #[tokio::test]
    async fn registered_handler_is_invocable() {
        let mut registry = HandlerRegistry::new();
        registry.register("t1", Handler::sync(|_, _, payload| payload["ok"] == json!(true)));
        let handler = registry.get("t1").unwrap();
        let env = crate::envelope::Envelope::build(json!({}), "s", None, None, None);
        assert!(handler.invoke("1-0", &env, &json!({"ok": true})).await);
    }

    #[test]
    fn topics_lists_specific_bindings_only() {
        let mut registry = HandlerRegistry::new();
        registry.register("t1", Handler::sync(|_, _, _| true));
        registry.register("t2", Handler::sync(|_, _, _| true));
        registry.set_default(Handler::sync(|_, _, _| true));
        let mut topics = registry.topics();
        topics.sort();
        assert_eq!(topics, vec!["t1".to_string(), "t2".to_string()]);
    }
}
