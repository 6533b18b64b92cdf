//! Routing client messages to their handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, event, warn};

use crate::config::ConfigTarget;
use crate::dto::ResultDto;
use crate::orchestrator::codes::{COMMIT_FAILED_CODE, PROVIDER_FAILED};
use crate::session::Session;

use super::host::EditorHost;
use super::{
    ClientMessage, CommitOutcome, CommitRequest, Envelope, LogRecord, Message, ServerMessage,
    SettingsValue, WorkspaceStatus, external_url,
};

/// Sending half of the outbound message queue.
pub type Outbox = mpsc::UnboundedSender<Envelope<ServerMessage>>;

/// One handler per [`ClientMessage`] variant.
///
/// Handlers answer by pushing to the outbox, never by returning a value.
/// A failing or panicking handler is logged and surfaced as a native error
/// notification.
#[derive(Clone)]
pub struct Dispatcher {
    session: Arc<Session>,
    host: Arc<dyn EditorHost>,
    outbox: Outbox,
}

impl Dispatcher {
    pub fn new(session: Arc<Session>, host: Arc<dyn EditorHost>, outbox: Outbox) -> Self {
        Self {
            session,
            host,
            outbox,
        }
    }

    pub async fn dispatch(&self, envelope: Envelope<ClientMessage>) {
        let Envelope { message, channel } = envelope;
        let kind = message.kind();
        debug!(kind, ?channel, "Dispatching message");

        let reply = Reply {
            outbox: self.outbox.clone(),
            channel: channel.clone(),
        };
        let this = self.clone();
        let outcome = tokio::spawn(async move { this.handle(message, &reply).await }).await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(kind, "Handler failed: {e:#}");
                self.host
                    .show_error(&format!("Something went wrong handling '{kind}': {e}"))
                    .await;
            }
            Err(e) => {
                error!(kind, "Handler panicked: {e}");
                let reply = Reply {
                    outbox: self.outbox.clone(),
                    channel,
                };
                reply.answer_aborted(kind);
                self.host
                    .show_error(&format!("Something went wrong handling '{kind}': handler panicked"))
                    .await;
            }
        }
    }

    async fn handle(&self, message: ClientMessage, reply: &Reply) -> Result<()> {
        match message {
            ClientMessage::Init => self.on_init(reply).await,
            ClientMessage::Ping => {
                reply.push(ServerMessage::Pong);
                Ok(())
            }
            ClientMessage::ShowInfo(info) => {
                self.host.show_info(&info.message).await;
                Ok(())
            }
            ClientMessage::OpenExternal(request) => {
                let url = external_url(&request.url)?;
                self.host.open_external(&url).await?;
                Ok(())
            }
            ClientMessage::GetSettings(request) => {
                let value = self.session.config().get(&request.section).unwrap_or(Value::Null);
                reply.push(ServerMessage::SettingsValue(SettingsValue {
                    section: request.section,
                    value,
                }));
                Ok(())
            }
            ClientMessage::UpdateSettings(change) => self.on_update_settings(change, reply),
            ClientMessage::Generate(options) => {
                let result = self.session.generate(options.unwrap_or_default()).await;
                reply.push(ServerMessage::GenerateResult(result));
                Ok(())
            }
            ClientMessage::Commit(request) => {
                self.on_commit(request, reply).await;
                Ok(())
            }
            ClientMessage::DiffFile(request) => {
                let path = self.resolve(&request.file_path)?;
                self.host
                    .open_diff(&path)
                    .await
                    .with_context(|| format!("Failed to open diff for {}", path.display()))
            }
            ClientMessage::ExecuteCommand(request) => {
                self.host.execute_command(&request.command, &request.args).await?;
                Ok(())
            }
            ClientMessage::SelectedFiles(paths) => {
                self.session.set_selection(paths);
                let diff = self.session.selected_diff().await?;
                reply.push(ServerMessage::DiffResult(diff));
                Ok(())
            }
            ClientMessage::Log(record) => {
                log_webview(&record, reply.channel.as_deref());
                Ok(())
            }
            ClientMessage::CloseWindow => {
                self.host.close_window().await;
                Ok(())
            }
        }
    }

    /// Workspace status first, then any cached message, then the diff.
    async fn on_init(&self, reply: &Reply) -> Result<()> {
        let status = self.workspace_status().await;
        let is_repo = status.is_git_repository;
        reply.push(ServerMessage::WorkspaceStatus(status));

        if let Some(cached) = self.session.messages().get() {
            reply.push(ServerMessage::GenerateResult(cached));
        }

        if is_repo {
            let diff = self.session.full_diff().await.context("Failed to collect diff")?;
            reply.push(ServerMessage::DiffResult(diff));
        }
        Ok(())
    }

    fn on_update_settings(&self, change: SettingsValue, reply: &Reply) -> Result<()> {
        let config = self.session.config();
        config.update(&change.section, change.value, ConfigTarget::Global)?;

        let value = config.get(&change.section).unwrap_or(Value::Null);
        reply.push(ServerMessage::SettingsUpdated(SettingsValue {
            section: change.section,
            value,
        }));
        Ok(())
    }

    /// Always answers with exactly one `commit-result`.
    async fn on_commit(&self, request: Option<CommitRequest>, reply: &Reply) {
        let message = match request {
            Some(request) => Some(request.message()),
            None => self.session.messages().message().map(|m| m.message()),
        };

        let outcome = match message {
            Some(message) if !message.trim().is_empty() => self
                .session
                .commit(&message)
                .await
                .map(|()| message)
                .map_err(|e| e.to_string()),
            _ => Err("No commit message to commit".to_string()),
        };

        match outcome {
            Ok(message) => {
                reply.push(ServerMessage::CommitResult(ResultDto::success(CommitOutcome {
                    message: message.clone(),
                })));
                let title = message.lines().next().unwrap_or_default();
                self.host.show_info(&format!("Committed: {title}")).await;

                self.session.set_selection(None);
                match self.session.full_diff().await {
                    Ok(diff) => reply.push(ServerMessage::DiffResult(diff)),
                    Err(e) => warn!("Failed to refresh diff after commit: {e}"),
                }
            }
            Err(reason) => {
                warn!("Commit failed: {reason}");
                reply.push(ServerMessage::CommitResult(ResultDto::failure(
                    COMMIT_FAILED_CODE,
                    reason.clone(),
                )));
                self.host.show_error(&format!("Commit failed: {reason}")).await;
            }
        }
    }

    async fn workspace_status(&self) -> WorkspaceStatus {
        let Some(root) = self.session.workspace_root() else {
            return WorkspaceStatus {
                error: Some("No workspace folder open".to_string()),
                ..Default::default()
            };
        };

        let mut status = WorkspaceStatus {
            workspace_root: Some(root.display().to_string()),
            is_workspace_valid: root.is_dir(),
            ..Default::default()
        };

        if !status.is_workspace_valid {
            status.error = Some(format!("{} is not a directory", root.display()));
        } else if self.session.git().is_repository().await {
            status.is_git_repository = true;
        } else {
            status.error = Some("Not a git repository".to_string());
        }
        status
    }

    /// Resolve a webview-supplied path against the workspace root.
    fn resolve(&self, file_path: &str) -> Result<PathBuf> {
        let path = Path::new(file_path);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        let root = self
            .session
            .workspace_root()
            .context("No workspace folder to resolve the path against")?;
        Ok(root.join(path))
    }
}

/// Pushes replies on the channel of the request being handled.
struct Reply {
    outbox: Outbox,
    channel: Option<String>,
}

impl Reply {
    /// Requests that always expect an answer still get one after a panic.
    fn answer_aborted(&self, kind: &str) {
        const ABORTED: &str = "Request aborted unexpectedly";
        match kind {
            "commit" => self.push(ServerMessage::CommitResult(ResultDto::failure(
                COMMIT_FAILED_CODE,
                ABORTED,
            ))),
            "generate" => self.push(ServerMessage::GenerateResult(ResultDto::failure(
                PROVIDER_FAILED,
                ABORTED,
            ))),
            _ => {}
        }
    }

    fn push(&self, message: ServerMessage) {
        let kind = message.kind();
        if self
            .outbox
            .send(Envelope::on_channel(message, self.channel.clone()))
            .is_err()
        {
            warn!(kind, "Outbox closed; dropping message");
        }
    }
}

/// Re-emit a webview log line as a tracing event.
fn log_webview(record: &LogRecord, envelope_channel: Option<&str>) {
    let channel = record.channel.as_deref().or(envelope_channel).unwrap_or("");
    let message = raw_text(&record.raw_message);

    match record.level.to_ascii_lowercase().as_str() {
        "error" => event!(target: "webview", Level::ERROR, channel, "{message}"),
        "warn" | "warning" => event!(target: "webview", Level::WARN, channel, "{message}"),
        "debug" => event!(target: "webview", Level::DEBUG, channel, "{message}"),
        "trace" => event!(target: "webview", Level::TRACE, channel, "{message}"),
        _ => event!(target: "webview", Level::INFO, channel, "{message}"),
    }
}

/// Strings are logged as-is, anything else as compact JSON.
fn raw_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
