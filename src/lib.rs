//! commitdeck - Generate git commit messages through pluggable providers.
//!
//! # Overview
//!
//! commitdeck turns the staged diff of a repository into a conventional
//! commit message. Providers (the built-in Claude Code CLI provider or
//! plugins discovered under the providers directory) each offer one or more
//! models; the [`orchestrator::CommitOrchestrator`] picks the active model and
//! normalizes every outcome into a [`dto::ResultDto`].
//!
//! The same session can be driven from the command line or from an editor
//! webview speaking the JSON protocol in [`protocol`].

pub mod config;
pub mod dto;
pub mod error;
pub mod git;
pub mod orchestrator;
pub mod protocol;
pub mod provider;
pub mod selection;
pub mod session;

// Re-export commonly used types
pub use config::{AppPaths, ConfigStore, ConfigTarget, Preferences, Settings};
pub use dto::ResultDto;
pub use error::{
    ConfigError, GenerateCommitError, GitError, HostError, PluginError, ProtocolError,
    ProviderError, SelectModelError,
};
pub use git::{DiffSummary, FileDiff, FileStatus, Git2Core, GitCore};
pub use orchestrator::CommitOrchestrator;
pub use protocol::{ClientMessage, Envelope, ServerMessage};
pub use provider::{GenerateOptions, GenerateResult, Model, Provider, ProviderRegistry};
pub use session::Session;
