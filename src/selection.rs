//! Diff statistics restricted to the files the user chose to include.
//!
//! The restricted summary is always recomputed from the full diff and the
//! current selection; it is never stored on its own.

use std::collections::HashSet;

use crate::git::DiffSummary;

/// Restrict `full` to the selected paths.
///
/// `changed` is the number of distinct selected paths. Only selected, non-binary
/// files add to `insertions`/`deletions`. `files` keeps the selected entries in
/// their original order.
pub fn restrict<S: AsRef<str>>(full: &DiffSummary, selected: &[S]) -> DiffSummary {
    let selected: HashSet<&str> = selected.iter().map(|s| s.as_ref()).collect();

    let mut summary = DiffSummary {
        files: Vec::new(),
        insertions: 0,
        deletions: 0,
        changed: selected.len(),
    };

    for file in full.files.iter().filter(|f| selected.contains(f.path.as_str())) {
        if !file.binary {
            summary.insertions += file.insertions;
            summary.deletions += file.deletions;
        }
        summary.files.push(file.clone());
    }

    summary
}

/// Apply an optional selection; `None` means every file is included.
pub fn apply(full: &DiffSummary, selection: Option<&[String]>) -> DiffSummary {
    match selection {
        Some(paths) => restrict(full, paths),
        None => full.clone(),
    }
}
