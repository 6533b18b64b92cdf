//! `GitCore` on top of git2: staging, diffing, committing.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::{
    DiffFindOptions, DiffOptions, ErrorCode, IndexAddOption, Oid, Repository, StatusOptions, Tree,
};
use tracing::debug;

use crate::error::GitError;

use super::GitCore;
use super::diff::{DiffSummary, summarize};

/// Git capability bound to one workspace root.
///
/// Every call reopens the repository on a blocking thread; `git2::Repository`
/// cannot be shared across tasks.
#[derive(Debug, Clone)]
pub struct Git2Core {
    root: PathBuf,
}

impl Git2Core {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locate the repository containing `path` and bind to its work tree.
    pub fn discover(path: &Path) -> Result<Self, GitError> {
        let repo = Repository::discover(path).map_err(|source| GitError::OpenRepository {
            path: path.to_path_buf(),
            source,
        })?;
        let root = repo
            .workdir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| path.to_path_buf());
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn with_repo<T, F>(&self, op: F) -> Result<T, GitError>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> Result<T, GitError> + Send + 'static,
    {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            let repo = open(&root)?;
            op(&repo)
        })
        .await
        .map_err(|e| GitError::TaskFailed(e.to_string()))?
    }
}

#[async_trait]
impl GitCore for Git2Core {
    async fn stage_all(&self) -> Result<(), GitError> {
        self.with_repo(stage_all).await
    }

    async fn diff_summary(&self, staged: bool) -> Result<DiffSummary, GitError> {
        self.with_repo(move |repo| diff_summary(repo, staged)).await
    }

    async fn is_repository(&self) -> bool {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || Repository::open(&root).is_ok())
            .await
            .unwrap_or(false)
    }

    async fn has_changes(&self) -> Result<bool, GitError> {
        self.with_repo(has_changes).await
    }

    async fn commit(&self, message: &str) -> Result<(), GitError> {
        let message = message.to_string();
        self.with_repo(move |repo| commit(repo, &message).map(|_| ()))
            .await
    }

    async fn last_commit_message(&self) -> Result<String, GitError> {
        self.with_repo(last_commit_message).await
    }

    async fn head_diff(&self) -> Result<DiffSummary, GitError> {
        self.with_repo(head_diff).await
    }

    async fn amend_commit(&self, message: &str) -> Result<(), GitError> {
        let message = message.to_string();
        self.with_repo(move |repo| amend_commit(repo, &message).map(|_| ()))
            .await
    }
}

fn open(root: &Path) -> Result<Repository, GitError> {
    Repository::open(root).map_err(|source| GitError::OpenRepository {
        path: root.to_path_buf(),
        source,
    })
}

/// Resolve the HEAD tree, distinguishing empty-repo errors from real failures.
///
/// Returns `Ok(None)` for repos with no commits (unborn branch / not found).
fn resolve_head_tree(repo: &Repository) -> Result<Option<Tree<'_>>, GitError> {
    let head_ref = match repo.head() {
        Ok(r) => r,
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            return Ok(None);
        }
        Err(e) => return Err(GitError::DiffFailed(e)),
    };

    let tree = head_ref.peel_to_tree().map_err(GitError::DiffFailed)?;
    Ok(Some(tree))
}

/// Stage everything, like `git add -A` (new, modified and deleted files).
pub fn stage_all(repo: &Repository) -> Result<(), GitError> {
    let mut index = repo.index().map_err(GitError::StagingFailed)?;
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .map_err(GitError::StagingFailed)?;
    index
        .update_all(["*"].iter(), None)
        .map_err(GitError::StagingFailed)?;
    index.write().map_err(GitError::StagingFailed)?;
    Ok(())
}

/// Summarize staged (HEAD → index) or unstaged (index → workdir) changes.
pub fn diff_summary(repo: &Repository, staged: bool) -> Result<DiffSummary, GitError> {
    let mut diff = if staged {
        let head_tree = resolve_head_tree(repo)?;
        repo.diff_tree_to_index(head_tree.as_ref(), None, None)
            .map_err(GitError::DiffFailed)?
    } else {
        let mut opts = DiffOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true).show_untracked_content(true);
        repo.diff_index_to_workdir(None, Some(&mut opts))
            .map_err(GitError::DiffFailed)?
    };

    let mut find = DiffFindOptions::new();
    find.renames(true);
    diff.find_similar(Some(&mut find)).map_err(GitError::DiffFailed)?;

    let summary = summarize(&diff)?;
    debug!(
        "Diff ({}): {} files, +{} -{}",
        if staged { "staged" } else { "unstaged" },
        summary.changed,
        summary.insertions,
        summary.deletions
    );
    Ok(summary)
}

/// Whether the work tree or index differs from HEAD (ignored files excluded).
pub fn has_changes(repo: &Repository) -> Result<bool, GitError> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true).include_ignored(false);
    let statuses = repo.statuses(Some(&mut opts)).map_err(GitError::StatusFailed)?;
    Ok(!statuses.is_empty())
}

/// Commit the current index on HEAD.
///
/// Works on an unborn branch: the first commit simply has no parent.
pub fn commit(repo: &Repository, message: &str) -> Result<Oid, GitError> {
    let mut index = repo.index().map_err(GitError::CommitFailed)?;
    let tree_id = index.write_tree().map_err(GitError::CommitFailed)?;
    let tree = repo.find_tree(tree_id).map_err(GitError::CommitFailed)?;

    let sig = repo.signature().map_err(GitError::ConfigError)?;

    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit().map_err(GitError::CommitFailed)?),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => None,
        Err(e) => return Err(GitError::CommitFailed(e)),
    };
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

    let oid = repo
        .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .map_err(GitError::CommitFailed)?;

    debug!("Created commit {oid}");
    Ok(oid)
}

/// Message of the commit HEAD points at.
pub fn last_commit_message(repo: &Repository) -> Result<String, GitError> {
    let head = repo.head().map_err(|_| GitError::NoHead)?;
    let commit = head.peel_to_commit().map_err(|_| GitError::NoHead)?;
    Ok(commit.message().unwrap_or_default().to_string())
}

/// Summarize what HEAD changed; a root commit diffs against the empty tree.
pub fn head_diff(repo: &Repository) -> Result<DiffSummary, GitError> {
    let head = repo.head().map_err(|_| GitError::NoHead)?;
    let commit = head.peel_to_commit().map_err(|_| GitError::NoHead)?;
    let tree = commit.tree().map_err(GitError::DiffFailed)?;
    let parent_tree = match commit.parent(0) {
        Ok(parent) => Some(parent.tree().map_err(GitError::DiffFailed)?),
        Err(_) => None,
    };

    let mut diff = repo
        .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)
        .map_err(GitError::DiffFailed)?;
    let mut find = DiffFindOptions::new();
    find.renames(true);
    diff.find_similar(Some(&mut find)).map_err(GitError::DiffFailed)?;

    summarize(&diff)
}

/// Rewrite HEAD with a new message and the current index tree.
pub fn amend_commit(repo: &Repository, message: &str) -> Result<Oid, GitError> {
    let head = repo.head().map_err(|_| GitError::NoHead)?;
    let last = head.peel_to_commit().map_err(|_| GitError::NoHead)?;

    let mut index = repo.index().map_err(GitError::AmendFailed)?;
    let tree_id = index.write_tree().map_err(GitError::AmendFailed)?;
    let tree = repo.find_tree(tree_id).map_err(GitError::AmendFailed)?;

    let oid = last
        .amend(Some("HEAD"), None, None, None, Some(message), Some(&tree))
        .map_err(GitError::AmendFailed)?;

    debug!("Amended HEAD as {oid}");
    Ok(oid)
}
