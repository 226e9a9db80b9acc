//! `FeatureRegistry` (spec §3): a unique mapping from trigger-prefix to
//! `Feature`, looked up by longest-matching-prefix of the rewritten
//! command content.

use std::{collections::HashMap, sync::Arc};

use crate::Feature;

/// A registry of features keyed by their trigger token. Registration is
/// expected to happen once at daemon startup; lookups are read-mostly and
/// protected by nothing beyond the `Arc` the registry itself is wrapped
/// in by its owner (the pipeline never mutates it after construction).
#[derive(Default)]
pub struct FeatureRegistry {
    features: HashMap<String, Arc<dyn Feature>>,
}

impl FeatureRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feature under its own trigger token.
    ///
    /// # Errors
    /// Returns an error if another feature is already registered under
    /// the same trigger (spec §3: "Unique keys").
    pub fn register(&mut self, feature: Arc<dyn Feature>) -> Result<(), String> {
        let trigger = feature.trigger().to_string();
        if trigger.is_empty() {
            return Err("a feature's trigger token must not be empty".to_string());
        }
        if self.features.contains_key(&trigger) {
            return Err(format!("duplicate feature trigger {trigger:?}"));
        }
        self.features.insert(trigger, feature);
        Ok(())
    }

    /// Find the feature whose trigger is a prefix of `content`, preferring
    /// the longest match when triggers overlap (e.g. `.s` and `.ss`).
    #[must_use]
    pub fn match_prefix(&self, content: &str) -> Option<Arc<dyn Feature>> {
        self.features
            .iter()
            .filter(|(trigger, _)| content.starts_with(trigger.as_str()))
            .max_by_key(|(trigger, _)| trigger.len())
            .map(|(_, feature)| Arc::clone(feature))
    }

    /// Iterate every registered feature, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Feature>> {
        self.features.values()
    }

    /// `true` iff at least one registered feature reports itself
    /// configured (spec §3 `CommandPipeline` invariant (a)).
    #[must_use]
    pub fn has_configured_feature(&self) -> bool {
        self.features.values().any(|f| f.is_configured())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::FeatureRegistry;
    use crate::{Command, Feature, PipelineResult};
    use std::sync::Arc;

    struct Stub(&'static str, bool);

    #[async_trait]
    impl Feature for Stub {
        fn trigger(&self) -> &str {
            self.0
        }

        async fn execute(&self, command: Command) -> PipelineResult {
            PipelineResult {
                command,
                output: "ok".to_string(),
                combined_output: "ok".to_string(),
                error: None,
            }
        }

        fn is_configured(&self) -> bool {
            self.1
        }
    }

    #[test]
    fn rejects_duplicate_triggers() {
        let mut registry = FeatureRegistry::new();
        assert!(registry.register(Arc::new(Stub(".s", true))).is_ok());
        assert!(registry.register(Arc::new(Stub(".s", true))).is_err());
    }

    #[test]
    fn longest_prefix_wins() {
        let mut registry = FeatureRegistry::new();
        registry.register(Arc::new(Stub(".s", true))).unwrap();
        registry.register(Arc::new(Stub(".ss", true))).unwrap();

        let matched = registry.match_prefix(".ss echo hi").unwrap();
        assert_eq!(matched.trigger(), ".ss");
    }

    #[test]
    fn no_match_returns_none() {
        let mut registry = FeatureRegistry::new();
        registry.register(Arc::new(Stub(".s", true))).unwrap();
        assert!(registry.match_prefix(".x echo hi").is_none());
    }

    #[test]
    fn configured_feature_detection() {
        let mut registry = FeatureRegistry::new();
        registry.register(Arc::new(Stub(".s", false))).unwrap();
        assert!(!registry.has_configured_feature());
        registry.register(Arc::new(Stub(".t", true))).unwrap();
        assert!(registry.has_configured_feature());
    }
}
