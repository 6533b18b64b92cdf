//! Built-in provider backed by the Claude Code CLI.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::process::Command;
use tracing::debug;

use crate::error::ProviderError;

use super::process::{provider_timeout, run};
use super::prompt::build_commit_prompt;
use super::response::parse_commit_response;
use super::{GenerateCommitInput, GenerateResult, Model, ModelMetrics, Provider};

pub const PROVIDER_ID: &str = "claude";

const PROGRAM: &str = "claude";
const DEFAULT_LANG: &str = "en";

/// Model ids paired with the CLI's `--model` alias.
const MODELS: [(&str, &str, &str, &str, ModelMetrics); 2] = [
    (
        "claude-sonnet",
        "sonnet",
        "Claude Sonnet",
        "Balanced quality and speed",
        ModelMetrics {
            accuracy: 0.9,
            speed: 0.7,
            cost: 0.5,
        },
    ),
    (
        "claude-haiku",
        "haiku",
        "Claude Haiku",
        "Fastest and cheapest",
        ModelMetrics {
            accuracy: 0.75,
            speed: 0.95,
            cost: 0.15,
        },
    ),
];

/// Generates commit messages through `claude -p`.
pub struct ClaudeProvider {
    program: String,
    models: Vec<Model>,
}

impl ClaudeProvider {
    pub fn new() -> Self {
        Self::with_program(PROGRAM)
    }

    /// Use a different executable, e.g. a wrapper script.
    pub fn with_program(program: impl Into<String>) -> Self {
        let models = MODELS
            .iter()
            .map(|(id, _, name, description, metrics)| Model {
                provider_id: PROVIDER_ID.to_string(),
                id: id.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                metrics: Some(*metrics),
            })
            .collect();

        Self {
            program: program.into(),
            models,
        }
    }

    fn cli_alias(model_id: &str) -> Option<&'static str> {
        MODELS
            .iter()
            .find(|(id, ..)| *id == model_id)
            .map(|(_, alias, ..)| *alias)
    }
}

impl Default for ClaudeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for ClaudeProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn display_name(&self) -> &str {
        "Claude"
    }

    fn description(&self) -> &str {
        "Commit messages from the Claude Code CLI"
    }

    fn models(&self) -> &[Model] {
        &self.models
    }

    async fn generate_commit(
        &self,
        input: GenerateCommitInput,
    ) -> Result<GenerateResult, ProviderError> {
        let alias = Self::cli_alias(&input.model)
            .ok_or_else(|| ProviderError::UnknownModel(input.model.clone()))?;

        if which::which(&self.program).is_err() {
            return Err(ProviderError::NotInstalled(self.program.clone()));
        }

        let prompt = build_commit_prompt(&input.diff, input.lang().unwrap_or(DEFAULT_LANG));
        debug!(model = %input.model, "Running {} ({} prompt chars)", self.program, prompt.len());

        let mut command = Command::new(&self.program);
        command
            .arg("-p")
            .arg(&prompt)
            .arg("--model")
            .arg(alias)
            .arg("--output-format")
            .arg("json");

        let stdout = run(command, None, provider_timeout()).await?;
        let mut result = parse_commit_response(&stdout)?;
        result.meta = Some(stamp(&input.model));
        Ok(result)
    }
}

fn stamp(model_id: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("generatedAt".into(), Value::String(Utc::now().to_rfc3339()));
    meta.insert("modelId".into(), Value::String(model_id.to_string()));
    meta.insert("providerId".into(), Value::String(PROVIDER_ID.to_string()));
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::DiffSummary;
    use crate::provider::validate_models;

    fn input(model: &str) -> GenerateCommitInput {
        GenerateCommitInput {
            model: model.to_string(),
            diff: DiffSummary::default(),
            options: None,
        }
    }

    #[test]
    fn test_models_are_valid() {
        let provider = ClaudeProvider::new();
        assert_eq!(provider.models().len(), 2);
        assert!(validate_models(provider.id(), provider.models()).is_ok());
    }

    #[test]
    fn test_cli_alias() {
        assert_eq!(ClaudeProvider::cli_alias("claude-haiku"), Some("haiku"));
        assert_eq!(ClaudeProvider::cli_alias("gpt-4"), None);
    }

    #[tokio::test]
    async fn test_unknown_model_is_rejected() {
        let provider = ClaudeProvider::new();
        let err = provider.generate_commit(input("other/model")).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnknownModel(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_reports_not_installed() {
        let provider = ClaudeProvider::with_program("commitdeck-no-such-claude-12345");
        let err = provider.generate_commit(input("claude-sonnet")).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotInstalled(_)));
    }

    #[test]
    fn test_stamp_fields() {
        let meta = stamp("claude-sonnet");
        assert_eq!(meta["modelId"], "claude-sonnet");
        assert_eq!(meta["providerId"], "claude");
        assert!(meta["generatedAt"].as_str().is_some_and(|s| s.contains('T')));
    }
}
