//! The long-lived state of one host process.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::config::ConfigStore;
use crate::dto::ResultDto;
use crate::error::{GenerateCommitError, GitError};
use crate::git::{DiffSummary, GitCore};
use crate::orchestrator::{CommitOrchestrator, codes};
use crate::provider::{GenerateOptions, GenerateResult};
use crate::selection;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Last generation outcome, kept so a reloaded UI can show it again.
///
/// Single slot, last write wins.
#[derive(Debug, Default)]
pub struct CommitMessageStore {
    slot: Mutex<Option<ResultDto<GenerateResult>>>,
}

impl CommitMessageStore {
    pub fn get(&self) -> Option<ResultDto<GenerateResult>> {
        lock(&self.slot).clone()
    }

    pub fn set(&self, result: ResultDto<GenerateResult>) {
        *lock(&self.slot) = Some(result);
    }

    /// The cached message if the last generation succeeded.
    pub fn message(&self) -> Option<GenerateResult> {
        lock(&self.slot).as_ref().and_then(|dto| dto.data().cloned())
    }
}

/// Services plus per-session state, shared by every message handler.
pub struct Session {
    workspace_root: Option<PathBuf>,
    git: Arc<dyn GitCore>,
    config: Arc<dyn ConfigStore>,
    orchestrator: Arc<CommitOrchestrator>,
    messages: CommitMessageStore,
    selection: Mutex<Option<Vec<String>>>,
}

impl Session {
    pub fn new(
        workspace_root: Option<PathBuf>,
        git: Arc<dyn GitCore>,
        config: Arc<dyn ConfigStore>,
        orchestrator: Arc<CommitOrchestrator>,
    ) -> Self {
        Self {
            workspace_root,
            git,
            config,
            orchestrator,
            messages: CommitMessageStore::default(),
            selection: Mutex::new(None),
        }
    }

    pub fn workspace_root(&self) -> Option<&Path> {
        self.workspace_root.as_deref()
    }

    pub fn git(&self) -> &dyn GitCore {
        self.git.as_ref()
    }

    pub fn config(&self) -> &dyn ConfigStore {
        self.config.as_ref()
    }

    pub fn orchestrator(&self) -> &CommitOrchestrator {
        &self.orchestrator
    }

    pub fn messages(&self) -> &CommitMessageStore {
        &self.messages
    }

    /// Paths the user chose to include; `None` means all files.
    pub fn selection(&self) -> Option<Vec<String>> {
        lock(&self.selection).clone()
    }

    pub fn set_selection(&self, paths: Option<Vec<String>>) {
        debug!(selected = ?paths.as_ref().map(Vec::len), "Updated file selection");
        *lock(&self.selection) = paths;
    }

    /// Staged changes, staging everything first when `git.autoStage` is on.
    pub async fn full_diff(&self) -> Result<DiffSummary, GitError> {
        if self.config.preferences().git.auto_stage {
            self.git.stage_all().await?;
        }
        self.git.diff_summary(true).await
    }

    /// The full diff restricted to the current selection.
    pub async fn selected_diff(&self) -> Result<DiffSummary, GitError> {
        let full = self.full_diff().await?;
        Ok(selection::apply(&full, self.selection().as_deref()))
    }

    /// Generate a message for the selected changes and cache the outcome.
    pub async fn generate(&self, options: GenerateOptions) -> ResultDto<GenerateResult> {
        let result = match self.selected_diff().await {
            Ok(diff) => self.orchestrator.generate(diff, None, options).await,
            Err(e) => {
                warn!("Could not collect diff for generation: {e}");
                Err(GenerateCommitError::new(
                    codes::DIFF_UNAVAILABLE,
                    format!("Failed to collect diff: {e}"),
                ))
            }
        };

        let dto = ResultDto::from(result);
        self.messages.set(dto.clone());
        dto
    }

    /// Stage everything and commit, failing without committing when there is
    /// nothing to commit.
    pub async fn commit(&self, message: &str) -> Result<(), GitError> {
        self.git.stage_all().await?;
        if !self.git.has_changes().await? {
            return Err(GitError::NoChanges);
        }
        self.git.commit(message).await
    }
}
