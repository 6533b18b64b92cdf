//! Editor-native affordances the dispatcher relies on.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use colored::Colorize;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

use crate::error::HostError;

/// What the surrounding editor (or terminal) can do for the webview.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EditorHost: Send + Sync {
    /// Native, non-blocking information notification.
    async fn show_info(&self, message: &str);

    /// Native error notification, visible outside the webview.
    async fn show_error(&self, message: &str);

    async fn open_external(&self, url: &Url) -> Result<(), HostError>;

    /// Open a diff view for `path` (absolute).
    async fn open_diff(&self, path: &Path) -> Result<(), HostError>;

    async fn execute_command(&self, command: &str, args: &[Value]) -> Result<(), HostError>;

    async fn close_window(&self);
}

/// Host used by `commitdeck serve` when no editor is attached.
///
/// Notifications go to stderr; links and diffs open in external programs.
#[derive(Debug, Clone)]
pub struct TerminalHost {
    workspace_root: PathBuf,
}

impl TerminalHost {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    fn launcher() -> Result<PathBuf, HostError> {
        ["xdg-open", "open"]
            .iter()
            .find_map(|program| which::which(program).ok())
            .ok_or(HostError::NoLauncher("open links"))
    }

    fn spawn_detached(mut command: Command, program: &str) -> Result<(), HostError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|source| HostError::LaunchFailed {
                program: program.to_string(),
                source,
            })
    }
}

#[async_trait]
impl EditorHost for TerminalHost {
    async fn show_info(&self, message: &str) {
        eprintln!("{} {}", "info:".green().bold(), message);
    }

    async fn show_error(&self, message: &str) {
        eprintln!("{} {}", "error:".red().bold(), message);
    }

    async fn open_external(&self, url: &Url) -> Result<(), HostError> {
        let launcher = Self::launcher()?;
        debug!("Opening {url} with {}", launcher.display());

        let mut command = Command::new(&launcher);
        command.arg(url.as_str());
        Self::spawn_detached(command, &launcher.display().to_string())
    }

    async fn open_diff(&self, path: &Path) -> Result<(), HostError> {
        if which::which("git").is_err() {
            return Err(HostError::NoLauncher("show diffs"));
        }

        let mut command = Command::new("git");
        command
            .args(["difftool", "--cached", "--no-prompt", "--"])
            .arg(path)
            .current_dir(&self.workspace_root);
        Self::spawn_detached(command, "git difftool")
    }

    async fn execute_command(&self, command: &str, _args: &[Value]) -> Result<(), HostError> {
        Err(HostError::Unsupported(format!("execute-command '{command}'")))
    }

    async fn close_window(&self) {
        info!("Webview asked to close the window");
    }
}
