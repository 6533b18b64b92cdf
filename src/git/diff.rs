//! Diff summaries: per-file change statistics collected with git2.

use std::fmt;

use git2::{Delta, Diff, Patch};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::GitError;

/// Maximum characters of patch text kept across all files of one summary.
const MAX_DIFF_LENGTH: usize = 30_000;

/// Status of a changed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    Unmerged,
    Unknown,
}

impl From<Delta> for FileStatus {
    fn from(delta: Delta) -> Self {
        match delta {
            Delta::Added | Delta::Untracked => FileStatus::Added,
            Delta::Modified | Delta::Typechange => FileStatus::Modified,
            Delta::Deleted => FileStatus::Deleted,
            Delta::Renamed => FileStatus::Renamed,
            Delta::Copied => FileStatus::Copied,
            Delta::Conflicted => FileStatus::Unmerged,
            _ => FileStatus::Unknown,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Added => write!(f, "Added"),
            FileStatus::Modified => write!(f, "Modified"),
            FileStatus::Deleted => write!(f, "Deleted"),
            FileStatus::Renamed => write!(f, "Renamed"),
            FileStatus::Copied => write!(f, "Copied"),
            FileStatus::Unmerged => write!(f, "Unmerged"),
            FileStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One changed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiff {
    pub path: String,
    /// Previous path for renames and copies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub status: FileStatus,
    pub insertions: usize,
    pub deletions: usize,
    #[serde(default)]
    pub binary: bool,
    /// Patch text, absent for binary files or once the text budget is spent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_text: Option<String>,
}

/// Aggregate statistics plus per-file detail for a set of changes.
///
/// `insertions`/`deletions` are the sums over non-binary files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub files: Vec<FileDiff>,
    pub insertions: usize,
    pub deletions: usize,
    pub changed: usize,
}

impl DiffSummary {
    /// Build a summary whose totals are derived from `files`.
    pub fn from_files(files: Vec<FileDiff>) -> Self {
        let (insertions, deletions) = files
            .iter()
            .filter(|f| !f.binary)
            .fold((0, 0), |(ins, del), f| (ins + f.insertions, del + f.deletions));

        Self {
            changed: files.len(),
            files,
            insertions,
            deletions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Look up a file by its current path.
    pub fn file(&self, path: &str) -> Option<&FileDiff> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Concatenated patch text of every file that still carries one.
    pub fn patch_text(&self) -> String {
        self.files
            .iter()
            .filter_map(|f| f.diff_text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }

    /// Whether any textual file lost its patch text to the size budget.
    pub fn is_truncated(&self) -> bool {
        self.files
            .iter()
            .any(|f| !f.binary && f.diff_text.is_none() && (f.insertions + f.deletions) > 0)
    }
}

/// Summarize a git2 diff into per-file statistics.
pub(crate) fn summarize(diff: &Diff<'_>) -> Result<DiffSummary, GitError> {
    let mut files = Vec::with_capacity(diff.deltas().len());
    let mut remaining = MAX_DIFF_LENGTH;

    for idx in 0..diff.deltas().len() {
        let patch = Patch::from_diff(diff, idx).map_err(GitError::DiffFailed)?;
        let Some(delta) = diff.get_delta(idx) else {
            continue;
        };

        let status = FileStatus::from(delta.status());
        let new_path = delta
            .new_file()
            .path()
            .map(|p| p.to_string_lossy().to_string());
        let old_path = delta
            .old_file()
            .path()
            .map(|p| p.to_string_lossy().to_string());

        let (path, old_path) = match status {
            FileStatus::Renamed | FileStatus::Copied => {
                (new_path.clone().or_else(|| old_path.clone()).unwrap_or_default(), old_path)
            }
            _ => (new_path.or(old_path).unwrap_or_default(), None),
        };

        if path.is_empty() {
            continue;
        }

        let mut file = FileDiff {
            path,
            old_path,
            status,
            insertions: 0,
            deletions: 0,
            binary: false,
            diff_text: None,
        };

        match patch {
            Some(mut patch) if !patch.delta().flags().is_binary() => {
                let (_, insertions, deletions) = patch.line_stats().map_err(GitError::DiffFailed)?;
                file.insertions = insertions;
                file.deletions = deletions;
                file.diff_text = take_patch_text(&mut patch, &mut remaining);
            }
            Some(_) => file.binary = true,
            None => file.binary = delta.flags().is_binary(),
        }

        files.push(file);
    }

    Ok(DiffSummary::from_files(files))
}

/// Render a patch if it fits in the remaining text budget.
fn take_patch_text(patch: &mut Patch<'_>, remaining: &mut usize) -> Option<String> {
    if *remaining == 0 {
        return None;
    }

    let buf = match patch.to_buf() {
        Ok(buf) => buf,
        Err(e) => {
            warn!("Failed to render patch text: {e}");
            return None;
        }
    };
    let text = String::from_utf8_lossy(&buf).to_string();

    if text.len() > *remaining {
        *remaining = 0;
        return None;
    }

    *remaining -= text.len();
    Some(text)
}
