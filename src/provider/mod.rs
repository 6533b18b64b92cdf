//! Commit-generation providers and the models they offer.
//!
//! Providers are open-ended: the built-in [`ClaudeProvider`] is compiled in,
//! everything else is discovered at runtime by a [`PluginLoader`] and kept in
//! the [`ProviderRegistry`].

pub mod claude;
pub mod external;
pub mod loader;
pub mod process;
pub mod prompt;
pub mod registry;
pub mod response;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PluginError, ProviderError};
use crate::git::DiffSummary;

pub use claude::ClaudeProvider;
pub use external::ExternalProvider;
pub use loader::{ManifestLoader, PluginLoader};
pub use registry::ProviderRegistry;

/// Relative quality scores in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub speed: f64,
    pub cost: f64,
}

/// A backend variant offered by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub provider_id: String,
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ModelMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl GenerateOptions {
    /// Fill unset fields from `defaults`; explicit values win.
    pub fn or(self, defaults: GenerateOptions) -> GenerateOptions {
        GenerateOptions {
            lang: self.lang.or(defaults.lang),
        }
    }
}

/// One generation request, built per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateCommitInput {
    /// Model id.
    pub model: String,
    pub diff: DiffSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerateOptions>,
}

impl GenerateCommitInput {
    pub fn lang(&self) -> Option<&str> {
        self.options.as_ref().and_then(|o| o.lang.as_deref())
    }
}

/// A generated commit message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResult {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl GenerateResult {
    /// Full commit message: title, blank line, body.
    pub fn message(&self) -> String {
        match self.body.as_deref().map(str::trim) {
            Some(body) if !body.is_empty() => format!("{}\n\n{}", self.title.trim(), body),
            _ => self.title.trim().to_string(),
        }
    }
}

/// A commit-message generator.
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    fn description(&self) -> &str;

    fn models(&self) -> &[Model];

    async fn generate_commit(
        &self,
        input: GenerateCommitInput,
    ) -> Result<GenerateResult, ProviderError>;
}

/// Whether `provider` lists a model with this id.
pub fn offers(provider: &dyn Provider, model_id: &str) -> bool {
    provider.models().iter().any(|m| m.id == model_id)
}

/// Check a provider's model list: ids unique, every model owned by `provider_id`.
pub fn validate_models(provider_id: &str, models: &[Model]) -> Result<(), PluginError> {
    let mut seen = HashSet::new();
    for model in models {
        if model.provider_id != provider_id {
            return Err(PluginError::ModelProviderMismatch {
                provider: provider_id.to_string(),
                model: model.id.clone(),
                declared: model.provider_id.clone(),
            });
        }
        if !seen.insert(model.id.as_str()) {
            return Err(PluginError::DuplicateModel {
                provider: provider_id.to_string(),
                model: model.id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    type Respond = Box<dyn Fn(&GenerateCommitInput) -> Result<GenerateResult, ProviderError> + Send + Sync>;

    /// Provider whose answer is a closure over the input.
    pub(crate) struct FakeProvider {
        pub id: String,
        pub display_name: String,
        pub models: Vec<Model>,
        respond: Respond,
    }

    impl FakeProvider {
        pub fn new(id: &str, model_ids: &[&str]) -> Self {
            let models = model_ids
                .iter()
                .map(|m| Model {
                    provider_id: id.to_string(),
                    id: m.to_string(),
                    name: m.to_string(),
                    description: String::new(),
                    metrics: None,
                })
                .collect();

            Self {
                id: id.to_string(),
                display_name: id.to_string(),
                models,
                respond: Box::new(|input: &GenerateCommitInput| {
                    Ok(GenerateResult {
                        title: format!("feat: generated by {}", input.model),
                        body: None,
                        meta: None,
                    })
                }),
            }
        }

        pub fn named(mut self, display_name: &str) -> Self {
            self.display_name = display_name.to_string();
            self
        }

        pub fn responding(
            mut self,
            respond: impl Fn(&GenerateCommitInput) -> Result<GenerateResult, ProviderError> + Send + Sync + 'static,
        ) -> Self {
            self.respond = Box::new(respond);
            self
        }
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn id(&self) -> &str {
            &self.id
        }

        fn display_name(&self) -> &str {
            &self.display_name
        }

        fn description(&self) -> &str {
            "fake"
        }

        fn models(&self) -> &[Model] {
            &self.models
        }

        async fn generate_commit(
            &self,
            input: GenerateCommitInput,
        ) -> Result<GenerateResult, ProviderError> {
            (self.respond)(&input)
        }
    }
}
