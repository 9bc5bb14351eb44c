//! Per-provider translation of raw suggestion responses.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::engines::OpenSearchTranslator;
use crate::Result;

/// Converts a raw provider response body into ordered suggestion strings.
pub trait SuggestionTranslator: Send + Sync {
    /// Parses `body` into suggestions.
    fn translate(&self, body: &str) -> Result<Vec<String>>;
}

impl<F> SuggestionTranslator for F
where
    F: Fn(&str) -> Result<Vec<String>> + Send + Sync,
{
    fn translate(&self, body: &str) -> Result<Vec<String>> {
        self(body)
    }
}

/// Translator table keyed by engine id, with a fallback for everyone else.
#[derive(Clone)]
pub struct TranslatorRegistry {
    default: Arc<dyn SuggestionTranslator>,
    by_engine: HashMap<String, Arc<dyn SuggestionTranslator>>,
}

impl TranslatorRegistry {
    /// Creates a registry using the OpenSearch translator for every engine.
    pub fn new() -> Self {
        Self {
            default: Arc::new(OpenSearchTranslator),
            by_engine: HashMap::new(),
        }
    }

    /// Creates a registry with the built-in provider translators registered.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::engines::register_translators(&mut registry);
        registry
    }

    /// Registers a translator for one engine id, replacing any previous one.
    pub fn register<T: SuggestionTranslator + 'static>(
        &mut self,
        engine_id: impl Into<String>,
        translator: T,
    ) {
        self.by_engine.insert(engine_id.into(), Arc::new(translator));
    }

    /// Replaces the fallback translator.
    pub fn set_default<T: SuggestionTranslator + 'static>(&mut self, translator: T) {
        self.default = Arc::new(translator);
    }

    /// Returns true if `engine_id` has a dedicated translator.
    pub fn has_translator(&self, engine_id: &str) -> bool {
        self.by_engine.contains_key(engine_id)
    }

    /// Returns the translator for `engine_id`.
    pub fn get(&self, engine_id: &str) -> Arc<dyn SuggestionTranslator> {
        self.by_engine
            .get(engine_id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default))
    }

    /// Translates `body` for `engine_id`, yielding no suggestions on failure.
    pub fn translate(&self, engine_id: &str, body: &str) -> Vec<String> {
        match self.get(engine_id).translate(body) {
            Ok(suggestions) => suggestions,
            Err(e) => {
                warn!("Translator for {} failed: {}", engine_id, e);
                Vec::new()
            }
        }
    }
}

impl Default for TranslatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TranslatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut engines: Vec<_> = self.by_engine.keys().collect();
        engines.sort();
        f.debug_struct("TranslatorRegistry")
            .field("engines", &engines)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::{LINKEDIN_ID, YELP_ID};
    use crate::SuggestError;

    #[test]
    fn test_default_translator() {
        let registry = TranslatorRegistry::new();
        let out = registry.translate("any", r#"["cat",["cats","catalog"]]"#);
        assert_eq!(out, vec!["cats", "catalog"]);
    }

    #[test]
    fn test_failure_yields_empty() {
        let registry = TranslatorRegistry::new();
        assert!(registry.translate("any", "{not json").is_empty());
    }

    #[test]
    fn test_register_closure() {
        let mut registry = TranslatorRegistry::new();
        registry.register("lines", |body: &str| -> Result<Vec<String>> {
            Ok(body.lines().map(str::to_string).collect())
        });
        assert!(registry.has_translator("lines"));
        assert_eq!(registry.translate("lines", "a\nb"), vec!["a", "b"]);
        assert_eq!(registry.translate("other", r#"["a",["x"]]"#), vec!["x"]);
    }

    #[test]
    fn test_registered_error_is_contained() {
        let mut registry = TranslatorRegistry::new();
        registry.register("broken", |_: &str| -> Result<Vec<String>> {
            Err(SuggestError::Translation("boom".into()))
        });
        assert!(registry.translate("broken", "anything").is_empty());
    }

    #[test]
    fn test_set_default() {
        let mut registry = TranslatorRegistry::new();
        registry.set_default(|body: &str| -> Result<Vec<String>> { Ok(vec![body.to_string()]) });
        assert_eq!(registry.translate("x", "raw"), vec!["raw"]);
    }

    #[test]
    fn test_with_builtin() {
        let registry = TranslatorRegistry::with_builtin();
        assert!(registry.has_translator(YELP_ID));
        assert!(registry.has_translator(LINKEDIN_ID));
        assert!(!registry.has_translator("https://www.google.com/"));
        let debug = format!("{:?}", registry);
        assert!(debug.contains("yelp"));
    }
}
