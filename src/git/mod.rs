//! Git capability consumed by the orchestrator, CLI and message handlers.

pub mod diff;
pub mod repository;

use async_trait::async_trait;

use crate::error::GitError;

pub use diff::{DiffSummary, FileDiff, FileStatus};
pub use repository::Git2Core;

/// Git operations the rest of the crate needs.
///
/// Every method may fail on repository or I/O errors; callers must not assume
/// success.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitCore: Send + Sync {
    /// Stage all changes (`git add -A`).
    async fn stage_all(&self) -> Result<(), GitError>;

    /// Summarize staged (`true`) or unstaged (`false`) changes.
    async fn diff_summary(&self, staged: bool) -> Result<DiffSummary, GitError>;

    /// Whether the workspace root is a git repository.
    async fn is_repository(&self) -> bool;

    /// Whether there is anything to commit.
    async fn has_changes(&self) -> Result<bool, GitError>;

    async fn commit(&self, message: &str) -> Result<(), GitError>;

    async fn last_commit_message(&self) -> Result<String, GitError>;

    /// Changes introduced by HEAD relative to its first parent.
    async fn head_diff(&self) -> Result<DiffSummary, GitError>;

    async fn amend_commit(&self, message: &str) -> Result<(), GitError>;
}
