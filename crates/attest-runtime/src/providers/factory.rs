//! Provider construction by type name.
//!
//! A surrounding application keeps its completion backend in config as a
//! type name plus a JSON blob; the registry turns that into an
//! `Arc<dyn LlmProvider>` after validating the blob.
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let provider = registry.create("openai", &json!({"api_key": key}))?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use super::{LlmProvider, ProviderError};

/// Builds one kind of provider from JSON configuration.
pub trait ProviderFactory: Send + Sync {
    /// Type name the registry files this factory under (e.g. "openai").
    fn provider_type(&self) -> &'static str;

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Reject a configuration before anything is built.
    fn validate_config(&self, _config: &JsonValue) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Configuration used when the caller supplies none.
    fn default_config(&self) -> JsonValue {
        JsonValue::Object(Map::new())
    }

    fn description(&self) -> &'static str {
        "Completion provider"
    }
}

/// Provider factories keyed by type name.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<&'static str, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every provider compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "openai")]
        registry.register(Arc::new(super::OpenAiProviderFactory));
        registry
    }

    /// Add a factory, returning the one it replaced under the same type name.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) -> Option<Arc<dyn ProviderFactory>> {
        self.factories.insert(factory.provider_type(), factory)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        self.register(factory);
        self
    }

    fn factory(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(provider_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider type '{}' (registered: {})",
                provider_type,
                self.provider_types().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Validate `config` and build a provider of `provider_type`.
    pub fn create(&self, provider_type: &str, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let factory = self.factory(provider_type)?;
        factory.validate_config(config)?;
        let provider = factory.create(config)?;

        tracing::debug!(provider_type, provider = provider.name(), "Created completion provider");
        Ok(provider)
    }

    pub fn validate(&self, provider_type: &str, config: &JsonValue) -> Result<(), ProviderError> {
        self.factory(provider_type)?.validate_config(config)
    }

    /// Registered type names in sorted order.
    pub fn provider_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    pub fn contains(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    pub fn default_config(&self, provider_type: &str) -> Option<JsonValue> {
        self.factories.get(provider_type).map(|f| f.default_config())
    }

    /// `(type, description)` for every registered factory.
    pub fn describe(&self) -> Vec<(&'static str, &'static str)> {
        self.factories
            .iter()
            .map(|(name, factory)| (*name, factory.description()))
            .collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.provider_types()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use serde_json::json;

    /// Builds scripted providers pre-loaded with an optional `reply`.
    struct ScriptedFactory;

    impl ProviderFactory for ScriptedFactory {
        fn provider_type(&self) -> &'static str {
            "scripted"
        }

        fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
            let provider = ScriptedProvider::new();
            if let Some(reply) = config.get("reply").and_then(JsonValue::as_str) {
                provider.push_text(reply);
            }
            Ok(Arc::new(provider))
        }

        fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
            match config.get("reply") {
                Some(reply) if !reply.is_string() => {
                    Err(ProviderError::NotConfigured("reply must be a string".to_string()))
                }
                _ => Ok(()),
            }
        }

        fn description(&self) -> &'static str {
            "Replays queued replies"
        }
    }

    #[test]
    fn test_create_registered_provider() {
        let registry = ProviderRegistry::new().with(Arc::new(ScriptedFactory));

        assert!(registry.contains("scripted"));
        assert!(!registry.contains("openai-compatible"));

        let provider = registry.create("scripted", &json!({"reply": "[]"})).unwrap();
        assert_eq!(provider.name(), "scripted");
    }

    #[test]
    fn test_create_validates_first() {
        let registry = ProviderRegistry::new().with(Arc::new(ScriptedFactory));

        assert!(registry.validate("scripted", &json!({})).is_ok());
        assert!(registry.create("scripted", &json!({"reply": 3})).is_err());
    }

    #[test]
    fn test_unknown_type_lists_registered() {
        let registry = ProviderRegistry::new().with(Arc::new(ScriptedFactory));

        match registry.create("unknown", &json!({})) {
            Err(ProviderError::NotConfigured(msg)) => {
                assert!(msg.contains("'unknown'"));
                assert!(msg.contains("scripted"));
            }
            other => panic!("expected NotConfigured, got {:?}", other.map(|p| p.name().to_string())),
        }
    }

    #[test]
    fn test_register_replaces_and_describes() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.register(Arc::new(ScriptedFactory)).is_none());
        assert!(registry.register(Arc::new(ScriptedFactory)).is_some());

        assert_eq!(registry.describe(), vec![("scripted", "Replays queued replies")]);
        assert_eq!(registry.default_config("scripted"), Some(json!({})));
        assert_eq!(format!("{registry:?}"), r#"["scripted"]"#);
    }
}
