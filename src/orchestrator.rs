//! Resolving the active model and invoking its provider.
//!
//! Every outcome comes back as `Result<_, GenerateCommitError>`; provider errors
//! and panics never escape raw.

use std::sync::{Arc, LazyLock};

use regex_lite::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ConfigStore, ConfigTarget, keys};
use crate::error::{GenerateCommitError, SelectModelError};
use crate::git::DiffSummary;
use crate::provider::{GenerateCommitInput, GenerateOptions, GenerateResult, Model, Provider, ProviderRegistry};

/// Numeric codes carried by [`GenerateCommitError`].
pub mod codes {
    /// No model configured and no provider registered.
    pub const NO_MODEL: i64 = -1;
    /// No registered provider offers the resolved model.
    pub const PROVIDER_NOT_FOUND: i64 = -2;
    /// The provider answered with an unusable result.
    pub const INVALID_RESULT: i64 = -3;
    /// The diff to describe could not be collected.
    pub const DIFF_UNAVAILABLE: i64 = -4;
    /// The provider failed or panicked.
    pub const PROVIDER_FAILED: i64 = -999;
    /// Commit failures reported to the UI.
    pub const COMMIT_FAILED_CODE: i64 = 500;
}

static CONVENTIONAL_TITLE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(feat|fix|docs|style|refactor|perf|test|build|ci|chore|revert)(\(.+\))?!?: .+").ok()
});

/// Whether `title` looks like a Conventional Commit subject.
pub fn is_conventional_title(title: &str) -> bool {
    CONVENTIONAL_TITLE
        .as_ref()
        .is_none_or(|re| re.is_match(title))
}

/// A model id together with the provider that serves it.
#[derive(Clone)]
pub struct Resolved {
    pub model_id: String,
    pub provider: Arc<dyn Provider>,
}

pub struct CommitOrchestrator {
    registry: Arc<ProviderRegistry>,
    config: Arc<dyn ConfigStore>,
}

impl CommitOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, config: Arc<dyn ConfigStore>) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Every known model, loading plugins first if needed.
    pub async fn models(&self) -> Vec<Model> {
        self.registry.initialize().await;
        self.registry.models()
    }

    /// The configured `model.id`, if any.
    pub fn configured_model_id(&self) -> Option<String> {
        self.config
            .get(keys::MODEL_ID)
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|id| !id.trim().is_empty())
    }

    /// Model id generation would use: `requested`, else `model.id`, else the
    /// first model of the first registered provider.
    pub async fn active_model_id(&self, requested: Option<&str>) -> Option<String> {
        self.registry.initialize().await;

        requested
            .map(str::to_string)
            .or_else(|| self.configured_model_id())
            .or_else(|| {
                self.registry
                    .list()
                    .first()
                    .and_then(|p| p.models().first())
                    .map(|m| m.id.clone())
            })
    }

    /// Resolve the model and its provider.
    ///
    /// A configured id that no provider offers is reported as
    /// [`codes::PROVIDER_NOT_FOUND`] rather than silently replaced.
    pub async fn resolve(&self, requested: Option<&str>) -> Result<Resolved, GenerateCommitError> {
        let model_id = self
            .active_model_id(requested)
            .await
            .ok_or_else(|| GenerateCommitError::new(codes::NO_MODEL, "No model available"))?;

        let provider = self.registry.provider_for_model(&model_id).ok_or_else(|| {
            GenerateCommitError::new(
                codes::PROVIDER_NOT_FOUND,
                format!("No provider found for model {model_id}"),
            )
        })?;

        Ok(Resolved { model_id, provider })
    }

    /// Generate a commit message for `diff`.
    ///
    /// `options` override the configured defaults (`git.lang`).
    pub async fn generate(
        &self,
        diff: DiffSummary,
        requested_model: Option<&str>,
        options: GenerateOptions,
    ) -> Result<GenerateResult, GenerateCommitError> {
        let Resolved { model_id, provider } = self.resolve(requested_model).await?;

        let defaults = GenerateOptions {
            lang: self
                .config
                .get(keys::GIT_LANG)
                .and_then(|v| v.as_str().map(str::to_string)),
        };
        let input = GenerateCommitInput {
            model: model_id.clone(),
            diff,
            options: Some(options.or(defaults)),
        };

        debug!(model = %model_id, provider = %provider.id(), "Generating commit message");

        // A panicking provider only takes down its own task.
        let outcome = tokio::spawn(async move { provider.generate_commit(input).await }).await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(model = %model_id, "Provider failed: {e}");
                return Err(GenerateCommitError::new(e.code(), e.to_string()));
            }
            Err(e) => {
                warn!(model = %model_id, "Provider task failed: {e}");
                return Err(GenerateCommitError::new(
                    codes::PROVIDER_FAILED,
                    format!("Failed to generate commit: {e}"),
                ));
            }
        };

        if result.title.trim().is_empty() {
            return Err(GenerateCommitError::new(
                codes::INVALID_RESULT,
                "Provider returned invalid data: empty title",
            ));
        }

        if !is_conventional_title(&result.title) {
            warn!("Generated title is not a conventional commit: {}", result.title);
        }

        Ok(result)
    }

    /// Make `model_id` the active model, persisting it to the user settings.
    pub async fn select_model(&self, model_id: &str) -> Result<(), SelectModelError> {
        self.registry.initialize().await;

        if self.registry.provider_for_model(model_id).is_none() {
            return Err(SelectModelError::UnknownModel(model_id.to_string()));
        }

        self.config
            .update(keys::MODEL_ID, Value::String(model_id.to_string()), ConfigTarget::Global)?;
        info!("Selected model {model_id}");
        Ok(())
    }
}
