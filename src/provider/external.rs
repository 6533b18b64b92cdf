//! Providers implemented by an external program.
//!
//! The program receives the JSON [`GenerateCommitInput`] on stdin and prints a
//! `ResultDto<GenerateResult>` on stdout.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::dto::ResultDto;
use crate::error::ProviderError;

use super::process::{provider_timeout, run};
use super::{GenerateCommitInput, GenerateResult, Model, Provider};

#[derive(Debug, Clone)]
pub struct ExternalProvider {
    pub(crate) id: String,
    pub(crate) display_name: String,
    pub(crate) description: String,
    pub(crate) models: Vec<Model>,
    pub(crate) command: String,
    pub(crate) args: Vec<String>,
    pub(crate) timeout: Option<Duration>,
    /// Plugin directory; the working directory of the spawned program.
    pub(crate) dir: PathBuf,
}

impl ExternalProvider {
    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// Commands containing a path separator are resolved against the plugin
    /// directory; bare names are looked up on `PATH`.
    fn program(&self) -> PathBuf {
        let command = PathBuf::from(&self.command);
        if command.is_absolute() || command.components().count() == 1 {
            command
        } else {
            self.dir.join(command)
        }
    }
}

#[async_trait]
impl Provider for ExternalProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn models(&self) -> &[Model] {
        &self.models
    }

    async fn generate_commit(
        &self,
        input: GenerateCommitInput,
    ) -> Result<GenerateResult, ProviderError> {
        let payload = serde_json::to_vec(&input)
            .map_err(|e| ProviderError::InvalidOutput(format!("could not encode input: {e}")))?;

        let mut command = Command::new(self.program());
        command.args(&self.args).current_dir(&self.dir);

        debug!(provider = %self.id, model = %input.model, "Spawning {}", self.command);
        let limit = self.timeout.unwrap_or_else(provider_timeout);
        let stdout = run(command, Some(&payload), limit).await?;

        let dto: ResultDto<GenerateResult> = serde_json::from_str(stdout.trim())
            .map_err(|e| ProviderError::InvalidOutput(format!("expected a result object: {e}")))?;

        dto.into_result().map_err(|e| ProviderError::Reported {
            code: e.code,
            message: e.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::DiffSummary;

    fn provider(dir: PathBuf, script: &str) -> ExternalProvider {
        ExternalProvider {
            id: "ext".into(),
            display_name: "External".into(),
            description: "test".into(),
            models: Vec::new(),
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
            timeout: Some(Duration::from_secs(5)),
            dir,
        }
    }

    fn input() -> GenerateCommitInput {
        GenerateCommitInput {
            model: "ext/a".into(),
            diff: DiffSummary::default(),
            options: None,
        }
    }

    #[test]
    fn test_program_resolution() {
        let mut p = provider(PathBuf::from("/plugins/ext"), "");
        assert_eq!(p.program(), PathBuf::from("sh"));

        p.command = "./bin/generate".into();
        assert_eq!(p.program(), PathBuf::from("/plugins/ext/./bin/generate"));

        p.command = "/usr/bin/env".into();
        assert_eq!(p.program(), PathBuf::from("/usr/bin/env"));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_success_result() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(
            dir.path().to_path_buf(),
            r#"cat >/dev/null; echo '{"ok":true,"data":{"title":"feat: add x"}}'"#,
        );
        let result = p.generate_commit(input()).await.unwrap();
        assert_eq!(result.title, "feat: add x");
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_receives_input_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(
            dir.path().to_path_buf(),
            r#"grep -q '"model":"ext/a"' && echo '{"ok":true,"data":{"title":"chore: saw model"}}'"#,
        );
        let result = p.generate_commit(input()).await.unwrap();
        assert_eq!(result.title, "chore: saw model");
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_reported_failure_keeps_code() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(
            dir.path().to_path_buf(),
            r#"echo '{"ok":false,"code":429,"message":"slow down"}'"#,
        );
        let err = p.generate_commit(input()).await.unwrap_err();
        assert_eq!(err.code(), 429);
        assert_eq!(err.to_string(), "slow down");
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_garbage_output() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(dir.path().to_path_buf(), "echo hello");
        let err = p.generate_commit(input()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidOutput(_)));
    }
}
