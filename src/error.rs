//! Error types for commitdeck modules using thiserror.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from git operations.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Failed to open repository at {path}: {source}")]
    OpenRepository {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("No changes to commit")]
    NoChanges,

    #[error("Failed to stage changes: {0}")]
    StagingFailed(#[source] git2::Error),

    #[error("Failed to collect diff: {0}")]
    DiffFailed(#[source] git2::Error),

    #[error("Failed to read repository status: {0}")]
    StatusFailed(#[source] git2::Error),

    #[error("Failed to create commit: {0}")]
    CommitFailed(#[source] git2::Error),

    #[error("Failed to amend last commit: {0}")]
    AmendFailed(#[source] git2::Error),

    #[error("Repository has no commits yet")]
    NoHead,

    #[error("Git config error (missing user.name or user.email): {0}")]
    ConfigError(#[source] git2::Error),

    #[error("Git task failed: {0}")]
    TaskFailed(String),
}

/// Errors from loading or updating settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine a per-user config directory")]
    NoConfigDir,

    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Invalid config key '{0}'")]
    InvalidKey(String),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Errors from discovering and validating provider plugins.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Failed to read provider manifest {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Provider manifest {path} is not valid JSON: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Provider manifest {path}: field `{field}` must be {expected}")]
    InvalidField {
        path: PathBuf,
        field: String,
        expected: &'static str,
    },

    #[error("Provider '{provider}' declares model '{model}' more than once")]
    DuplicateModel { provider: String, model: String },

    #[error("Model '{model}' belongs to provider '{declared}', not '{provider}'")]
    ModelProviderMismatch {
        provider: String,
        model: String,
        declared: String,
    },

    #[error("Failed to list providers directory {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by a provider while generating a commit message.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{0} not found on PATH")]
    NotInstalled(String),

    #[error("Failed to spawn provider process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Failed to talk to provider process: {0}")]
    Io(#[source] std::io::Error),

    #[error("Provider process timed out after {0} seconds")]
    Timeout(u64),

    #[error("Provider process exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("Provider returned invalid output: {0}")]
    InvalidOutput(String),

    #[error("Provider does not offer model '{0}'")]
    UnknownModel(String),

    #[error("{message}")]
    Reported { code: i64, message: String },
}

impl ProviderError {
    /// Numeric code surfaced to callers; provider-reported codes pass through.
    pub fn code(&self) -> i64 {
        match self {
            ProviderError::Reported { code, .. } => *code,
            _ => crate::orchestrator::codes::PROVIDER_FAILED,
        }
    }
}

/// Normalized generation failure: a numeric code plus a message.
///
/// Callers branch on `code` (see [`crate::orchestrator::codes`]) rather than on
/// the message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct GenerateCommitError {
    pub code: i64,
    pub message: String,
}

impl GenerateCommitError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors from switching the active model.
#[derive(Error, Debug)]
pub enum SelectModelError {
    #[error("Unknown model '{0}'. Run `commitdeck list-models` to see available models.")]
    UnknownModel(String),

    #[error("Failed to persist model selection: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from editor-native host operations.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Operation not supported by this host: {0}")]
    Unsupported(String),

    #[error("Refusing to open URL '{0}'")]
    RejectedUrl(String),

    #[error("No program available to {0}")]
    NoLauncher(&'static str),

    #[error("Failed to launch {program}: {source}")]
    LaunchFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from decoding protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Message is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Message has no string `type` field")]
    MissingType,

    #[error("Unknown message type '{0}'")]
    UnknownType(String),

    #[error("Malformed '{kind}' message: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}
