//! Messages exchanged between the host process and the webview.
//!
//! On the wire every message is a JSON object `{type, data?, channel?}`.
//! [`ClientMessage`] flows webview to host and [`ServerMessage`] flows back.
//! Replies echo the `channel` of the request that caused them.

pub mod dispatcher;
pub mod host;
pub mod transport;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::dto::ResultDto;
use crate::error::{HostError, ProtocolError};
use crate::git::DiffSummary;
use crate::provider::{GenerateOptions, GenerateResult};

pub use dispatcher::{Dispatcher, Outbox};
pub use host::{EditorHost, TerminalHost};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowInfo {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenExternal {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsSection {
    pub section: String,
}

/// A settings key with its value; `null` when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsValue {
    pub section: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRequest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl CommitRequest {
    pub fn message(&self) -> String {
        GenerateResult {
            title: self.title.clone(),
            body: self.body.clone(),
            meta: None,
        }
        .message()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffFile {
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteCommand {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

/// A webview console line. `raw_message` is whatever the webview logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub level: String,
    #[serde(default)]
    pub raw_message: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<String>,
    pub is_workspace_valid: bool,
    pub is_git_repository: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Webview to host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    Init,
    Ping,
    CloseWindow,
    ShowInfo(ShowInfo),
    OpenExternal(OpenExternal),
    GetSettings(SettingsSection),
    UpdateSettings(SettingsValue),
    Generate(Option<GenerateOptions>),
    /// Commit the given message, or the cached generation when absent.
    Commit(Option<CommitRequest>),
    DiffFile(DiffFile),
    ExecuteCommand(ExecuteCommand),
    /// Paths to include; absent clears the selection.
    SelectedFiles(Option<Vec<String>>),
    Log(LogRecord),
}

/// Host to webview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    Pong,
    DiffResult(DiffSummary),
    #[serde(alias = "commit-message")]
    GenerateResult(ResultDto<GenerateResult>),
    CommitResult(ResultDto<CommitOutcome>),
    SettingsValue(SettingsValue),
    SettingsUpdated(SettingsValue),
    WorkspaceStatus(WorkspaceStatus),
}

/// A closed set of message types sharing the `{type, data}` encoding.
pub trait Message: Serialize + DeserializeOwned {
    /// Every accepted `type` string, aliases included.
    const TYPES: &'static [&'static str];

    fn kind(&self) -> &'static str;
}

impl Message for ClientMessage {
    const TYPES: &'static [&'static str] = &[
        "init",
        "ping",
        "close-window",
        "show-info",
        "open-external",
        "get-settings",
        "update-settings",
        "generate",
        "commit",
        "diff-file",
        "execute-command",
        "selected-files",
        "log",
    ];

    fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Init => "init",
            ClientMessage::Ping => "ping",
            ClientMessage::CloseWindow => "close-window",
            ClientMessage::ShowInfo(_) => "show-info",
            ClientMessage::OpenExternal(_) => "open-external",
            ClientMessage::GetSettings(_) => "get-settings",
            ClientMessage::UpdateSettings(_) => "update-settings",
            ClientMessage::Generate(_) => "generate",
            ClientMessage::Commit(_) => "commit",
            ClientMessage::DiffFile(_) => "diff-file",
            ClientMessage::ExecuteCommand(_) => "execute-command",
            ClientMessage::SelectedFiles(_) => "selected-files",
            ClientMessage::Log(_) => "log",
        }
    }
}

impl Message for ServerMessage {
    const TYPES: &'static [&'static str] = &[
        "pong",
        "diff-result",
        "generate-result",
        "commit-message",
        "commit-result",
        "settings-value",
        "settings-updated",
        "workspace-status",
    ];

    fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Pong => "pong",
            ServerMessage::DiffResult(_) => "diff-result",
            ServerMessage::GenerateResult(_) => "generate-result",
            ServerMessage::CommitResult(_) => "commit-result",
            ServerMessage::SettingsValue(_) => "settings-value",
            ServerMessage::SettingsUpdated(_) => "settings-updated",
            ServerMessage::WorkspaceStatus(_) => "workspace-status",
        }
    }
}

/// A message plus the channel it travels on.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    pub message: M,
    pub channel: Option<String>,
}

impl<M: Message> Envelope<M> {
    pub fn new(message: M) -> Self {
        Self {
            message,
            channel: None,
        }
    }

    pub fn on_channel(message: M, channel: Option<String>) -> Self {
        Self { message, channel }
    }

    /// Encode as one line of JSON.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let mut value = serde_json::to_value(&self.message).map_err(ProtocolError::Encode)?;
        if let (Some(channel), Value::Object(map)) = (&self.channel, &mut value) {
            map.insert("channel".to_string(), Value::String(channel.clone()));
        }
        serde_json::to_string(&value).map_err(ProtocolError::Encode)
    }

    /// Decode one message, telling unknown types apart from malformed payloads.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();
        if !M::TYPES.contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownType(kind));
        }

        let channel = value
            .as_object_mut()
            .and_then(|map| map.remove("channel"))
            .and_then(|c| c.as_str().map(str::to_string));

        let message = serde_json::from_value(value)
            .map_err(|source| ProtocolError::InvalidPayload { kind, source })?;

        Ok(Self { message, channel })
    }
}

/// Parse a URL the webview asked to open, allowing only web and mail links.
pub fn external_url(raw: &str) -> Result<Url, HostError> {
    let url = Url::parse(raw).map_err(|_| HostError::RejectedUrl(raw.to_string()))?;
    match url.scheme() {
        "http" | "https" | "mailto" => Ok(url),
        _ => Err(HostError::RejectedUrl(raw.to_string())),
    }
}
