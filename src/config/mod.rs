//! User settings: a JSON file under the per-user config dir, layered with
//! environment overrides and validated against [`Preferences`].
//!
//! Load order is defaults, then the user file, then environment, then
//! session-only overrides. A file that is not valid JSON or fails validation is
//! ignored with a warning; loading never fails.

pub mod paths;

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::ConfigError;

pub use paths::AppPaths;

/// Dot-path keys of the settings commitdeck reads.
pub mod keys {
    pub const LOG_LEVEL: &str = "log.level";
    pub const MODEL_ID: &str = "model.id";
    pub const GIT_LANG: &str = "git.lang";
    pub const GIT_AUTO_STAGE: &str = "git.autoStage";
    pub const GIT_EMPTY_CHANGE_BEHAVIOR: &str = "git.emptyChangeBehavior";
    pub const UI_MODE: &str = "ui.mode";
    pub const PROXY_URL: &str = "proxy.url";
    pub const PROXY_ENABLED: &str = "proxy.enabled";
    pub const API_KEYS: &str = "apiKeys";
}

/// Where an update is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigTarget {
    /// Persisted to the user's config file.
    Global,
    /// Kept in memory for the lifetime of this process.
    Session,
}

/// Read/write access to settings by dot path (`git.lang`, `model.id`, ...).
#[cfg_attr(test, mockall::automock)]
pub trait ConfigStore: Send + Sync {
    /// Merged value at `key`; an empty key returns the whole settings object.
    fn get(&self, key: &str) -> Option<Value>;

    /// Set `key` to `value`. `Value::Null` removes the key from that layer.
    ///
    /// Rejected if the merged settings would no longer validate.
    fn update(&self, key: &str, value: Value, target: ConfigTarget) -> Result<(), ConfigError>;

    /// Typed view of the merged settings.
    fn preferences(&self) -> Preferences;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// What `gen` does when nothing is staged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyChangeBehavior {
    #[default]
    Skip,
    Amend,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiMode {
    Silent,
    Notification,
    #[default]
    Window,
    Panel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogPreferences {
    pub level: LogLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelPreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct GitPreferences {
    pub lang: String,
    pub auto_stage: bool,
    pub empty_change_behavior: EmptyChangeBehavior,
}

impl Default for GitPreferences {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            auto_stage: true,
            empty_change_behavior: EmptyChangeBehavior::Skip,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UiPreferences {
    pub mode: UiMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyPreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub enabled: bool,
}

/// The settings schema. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Preferences {
    pub log: LogPreferences,
    pub model: ModelPreferences,
    pub git: GitPreferences,
    pub ui: UiPreferences,
    pub proxy: ProxyPreferences,
    pub api_keys: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct Layers {
    file: Value,
    env: Value,
    session: Value,
}

impl Layers {
    fn merged(&self) -> Value {
        let mut merged = defaults();
        merge(&mut merged, &self.file);
        merge(&mut merged, &self.env);
        merge(&mut merged, &self.session);
        merged
    }
}

/// JSON-file backed [`ConfigStore`].
#[derive(Debug)]
pub struct Settings {
    path: Option<PathBuf>,
    layers: Mutex<Layers>,
}

impl Settings {
    /// Load from the standard config file.
    pub fn load(paths: &AppPaths) -> Self {
        Self::load_from(paths.config_file())
    }

    /// Load from `path`, layering environment overrides on top.
    pub fn load_from(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = read_user_file(&path);
        let env = env_overrides(&file);

        Self {
            path: Some(path),
            layers: Mutex::new(Layers {
                file,
                env,
                session: empty(),
            }),
        }
    }

    /// Settings that are never read from or written to disk.
    pub fn in_memory() -> Self {
        Self::with_values(empty())
    }

    /// In-memory settings seeded with `values` as the user layer.
    ///
    /// Invalid `values` are ignored with a warning, like an invalid file.
    pub fn with_values(values: Value) -> Self {
        let file = if is_valid_layer(&values) {
            values
        } else {
            warn!("Ignoring invalid settings, using defaults");
            empty()
        };

        Self {
            path: None,
            layers: Mutex::new(Layers {
                file,
                env: empty(),
                session: empty(),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write a default `config.json` if none exists. Returns whether a file was written.
    pub fn init_file(path: &Path) -> Result<bool, ConfigError> {
        if path.exists() {
            return Ok(false);
        }
        write_atomically(path, &defaults())?;
        Ok(true)
    }

    fn layers(&self) -> MutexGuard<'_, Layers> {
        self.layers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConfigStore for Settings {
    fn get(&self, key: &str) -> Option<Value> {
        let merged = self.layers().merged();
        lookup(&merged, key).cloned()
    }

    fn update(&self, key: &str, value: Value, target: ConfigTarget) -> Result<(), ConfigError> {
        let mut layers = self.layers();
        let mut candidate = layers.clone();

        let layer = match target {
            ConfigTarget::Global => &mut candidate.file,
            ConfigTarget::Session => &mut candidate.session,
        };
        set_path(layer, key, value)?;

        serde_json::from_value::<Preferences>(candidate.merged()).map_err(|e| {
            ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })?;

        if target == ConfigTarget::Global
            && let Some(path) = &self.path
        {
            write_atomically(path, &candidate.file)?;
        }

        debug!(key, ?target, "Updated setting");
        *layers = candidate;
        Ok(())
    }

    fn preferences(&self) -> Preferences {
        let merged = self.layers().merged();
        serde_json::from_value(merged).unwrap_or_else(|e| {
            warn!("Settings failed validation, using defaults: {e}");
            Preferences::default()
        })
    }
}

fn empty() -> Value {
    Value::Object(Map::new())
}

fn defaults() -> Value {
    serde_json::to_value(Preferences::default()).unwrap_or_else(|_| empty())
}

fn is_valid_layer(layer: &Value) -> bool {
    if !layer.is_object() {
        return false;
    }
    let mut merged = defaults();
    merge(&mut merged, layer);
    serde_json::from_value::<Preferences>(merged).is_ok()
}

/// Read the user file, returning an empty layer when it is missing or invalid.
fn read_user_file(path: &Path) -> Value {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No config file at {}, using defaults", path.display());
            return empty();
        }
        Err(e) => {
            warn!("Failed to read {}, using defaults: {e}", path.display());
            return empty();
        }
    };

    let value: Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            warn!("{} is not valid JSON, using defaults: {e}", path.display());
            return empty();
        }
    };

    if !is_valid_layer(&value) {
        warn!("{} does not match the settings schema, using defaults", path.display());
        return empty();
    }

    value
}

/// Build the environment layer. Dropped entirely if it would not validate on
/// top of `file`.
fn env_overrides(file: &Value) -> Value {
    let mut layer = empty();

    let mut set = |key: &str, value: Value| {
        // Keys are static and well-formed.
        let _ = set_path(&mut layer, key, value);
    };

    if let Some(id) = env_string("COMMITDECK_MODEL_ID") {
        set(keys::MODEL_ID, Value::String(id));
    }
    if let Some(lang) = env_string("COMMITDECK_GIT_LANG") {
        set(keys::GIT_LANG, Value::String(lang));
    }
    if let Some(level) = env_string("COMMITDECK_LOG_LEVEL") {
        set(keys::LOG_LEVEL, Value::String(level.to_lowercase()));
    }
    if let Some(raw) = env_string("COMMITDECK_GIT_AUTO_STAGE") {
        match parse_bool(&raw) {
            Some(flag) => set(keys::GIT_AUTO_STAGE, Value::Bool(flag)),
            None => warn!("Invalid COMMITDECK_GIT_AUTO_STAGE value '{raw}', ignoring"),
        }
    }
    if let Some(url) = env_string("HTTPS_PROXY").or_else(|| env_string("HTTP_PROXY")) {
        set(keys::PROXY_URL, Value::String(url));
        set(keys::PROXY_ENABLED, Value::Bool(true));
    }
    for (provider, var) in [("anthropic", "ANTHROPIC_API_KEY"), ("openai", "OPENAI_API_KEY")] {
        if let Some(api_key) = env_string(var) {
            set(&format!("{}.{provider}", keys::API_KEYS), Value::String(api_key));
        }
    }

    let mut merged = defaults();
    merge(&mut merged, file);
    merge(&mut merged, &layer);
    if let Err(e) = serde_json::from_value::<Preferences>(merged) {
        warn!("Ignoring environment overrides: {e}");
        return empty();
    }

    layer
}

fn env_string(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Deep-merge `overlay` into `base`. `null` in the overlay removes the key.
fn merge(base: &mut Value, overlay: &Value) {
    let (Value::Object(base), Value::Object(overlay)) = (base, overlay) else {
        return;
    };

    for (key, value) in overlay {
        if value.is_null() {
            base.remove(key);
            continue;
        }
        if let Some(existing) = base.get_mut(key)
            && existing.is_object()
            && value.is_object()
        {
            merge(existing, value);
            continue;
        }
        base.insert(key.clone(), value.clone());
    }
}

fn lookup<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        return Some(value);
    }
    key.split('.').try_fold(value, |current, segment| current.get(segment))
}

fn set_path(root: &mut Value, key: &str, value: Value) -> Result<(), ConfigError> {
    let segments: Vec<&str> = key.split('.').collect();
    if key.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return Err(ConfigError::InvalidKey(key.to_string()));
    }

    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| ConfigError::InvalidKey(key.to_string()))?;

    let mut current = root;
    for segment in parents {
        let Value::Object(map) = current else {
            return Err(ConfigError::InvalidKey(key.to_string()));
        };
        let entry = map.entry(segment.to_string()).or_insert_with(empty);
        if entry.is_null() {
            *entry = empty();
        }
        current = entry;
    }

    match current {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        _ => Err(ConfigError::InvalidKey(key.to_string())),
    }
}

fn write_atomically(path: &Path, value: &Value) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(write_err)?;

    let content = serde_json::to_string_pretty(value).map_err(ConfigError::Serialize)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(content.as_bytes()).map_err(write_err)?;
    tmp.write_all(b"\n").map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;

    const ENV_VARS: [&str; 8] = [
        "COMMITDECK_MODEL_ID",
        "COMMITDECK_GIT_LANG",
        "COMMITDECK_LOG_LEVEL",
        "COMMITDECK_GIT_AUTO_STAGE",
        "HTTPS_PROXY",
        "HTTP_PROXY",
        "ANTHROPIC_API_KEY",
        "OPENAI_API_KEY",
    ];

    fn without_env<R>(f: impl FnOnce() -> R) -> R {
        let vars: Vec<(&str, Option<&str>)> = ENV_VARS.iter().map(|v| (*v, None)).collect();
        temp_env::with_vars(vars, f)
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::in_memory();
        let prefs = settings.preferences();

        assert_eq!(prefs.git.lang, "en");
        assert!(prefs.git.auto_stage);
        assert_eq!(prefs.git.empty_change_behavior, EmptyChangeBehavior::Skip);
        assert_eq!(prefs.ui.mode, UiMode::Window);
        assert_eq!(prefs.model.id, None);
        assert_eq!(settings.get(keys::GIT_LANG), Some(json!("en")));
        assert_eq!(settings.get(keys::MODEL_ID), None);
    }

    #[test]
    fn test_get_by_dot_path_and_section() {
        let settings = Settings::with_values(json!({"git": {"lang": "fr"}}));
        assert_eq!(settings.get("git.lang"), Some(json!("fr")));
        let git = settings.get("git").unwrap();
        assert_eq!(git.get("autoStage"), Some(&json!(true)));
        assert!(settings.get("").is_some_and(|v| v.is_object()));
        assert_eq!(settings.get("git.nope"), None);
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let settings = Settings::with_values(json!({"git": {"autoStage": "sometimes"}}));
        assert!(settings.preferences().git.auto_stage);
    }

    #[test]
    #[serial]
    fn test_load_from_invalid_json_uses_defaults() {
        without_env(|| {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("config.json");
            fs::write(&path, "{ not json").unwrap();

            let settings = Settings::load_from(&path);
            assert_eq!(settings.preferences(), Preferences::default());
        });
    }

    #[test]
    #[serial]
    fn test_load_from_schema_violation_uses_defaults() {
        without_env(|| {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("config.json");
            fs::write(&path, r#"{"ui": {"mode": "hologram"}}"#).unwrap();

            let settings = Settings::load_from(&path);
            assert_eq!(settings.preferences().ui.mode, UiMode::Window);
        });
    }

    #[test]
    #[serial]
    fn test_load_from_missing_file_uses_defaults() {
        without_env(|| {
            let dir = tempfile::tempdir().unwrap();
            let settings = Settings::load_from(dir.path().join("absent.json"));
            assert_eq!(settings.preferences(), Preferences::default());
        });
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"model": {"id": "file/model"}, "git": {"lang": "de"}}"#).unwrap();

        without_env(|| {
            temp_env::with_vars(
                [
                    ("COMMITDECK_MODEL_ID", Some("env/model")),
                    ("COMMITDECK_GIT_AUTO_STAGE", Some("false")),
                    ("HTTPS_PROXY", Some("http://proxy:8080")),
                ],
                || {
                    let settings = Settings::load_from(&path);
                    let prefs = settings.preferences();
                    assert_eq!(prefs.model.id.as_deref(), Some("env/model"));
                    assert_eq!(prefs.git.lang, "de");
                    assert!(!prefs.git.auto_stage);
                    assert_eq!(prefs.proxy.url.as_deref(), Some("http://proxy:8080"));
                    assert!(prefs.proxy.enabled);
                },
            );
        });
    }

    #[test]
    #[serial]
    fn test_invalid_env_log_level_is_ignored() {
        without_env(|| {
            temp_env::with_var("COMMITDECK_LOG_LEVEL", Some("loud"), || {
                let dir = tempfile::tempdir().unwrap();
                let settings = Settings::load_from(dir.path().join("config.json"));
                assert_eq!(settings.preferences().log.level, LogLevel::Info);
            });
        });
    }

    #[test]
    #[serial]
    fn test_global_update_persists() {
        without_env(|| {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("config.json");

            let settings = Settings::load_from(&path);
            settings
                .update(keys::MODEL_ID, json!("claude/claude-haiku"), ConfigTarget::Global)
                .unwrap();

            let reloaded = Settings::load_from(&path);
            assert_eq!(reloaded.get(keys::MODEL_ID), Some(json!("claude/claude-haiku")));
        });
    }

    #[test]
    #[serial]
    fn test_session_update_is_not_persisted() {
        without_env(|| {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("config.json");

            let settings = Settings::load_from(&path);
            settings
                .update(keys::GIT_LANG, json!("ja"), ConfigTarget::Session)
                .unwrap();
            assert_eq!(settings.get(keys::GIT_LANG), Some(json!("ja")));
            assert!(!path.exists());
        });
    }

    #[test]
    fn test_update_rejects_schema_violation() {
        let settings = Settings::in_memory();
        let err = settings
            .update(keys::GIT_EMPTY_CHANGE_BEHAVIOR, json!("explode"), ConfigTarget::Global)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert_eq!(settings.get(keys::GIT_EMPTY_CHANGE_BEHAVIOR), Some(json!("skip")));
    }

    #[test]
    fn test_update_rejects_unknown_key() {
        let settings = Settings::in_memory();
        assert!(settings.update("git.colour", json!("red"), ConfigTarget::Session).is_err());
        assert!(matches!(
            settings.update("git..lang", json!("en"), ConfigTarget::Session),
            Err(ConfigError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_null_update_restores_default() {
        let settings = Settings::with_values(json!({"git": {"lang": "fr"}}));
        settings.update(keys::GIT_LANG, Value::Null, ConfigTarget::Global).unwrap();
        assert_eq!(settings.get(keys::GIT_LANG), Some(json!("en")));
    }

    #[test]
    fn test_api_keys_accept_any_provider() {
        let settings = Settings::in_memory();
        settings
            .update("apiKeys.acme", json!("secret"), ConfigTarget::Session)
            .unwrap();
        assert_eq!(settings.preferences().api_keys.get("acme").map(String::as_str), Some("secret"));
    }

    #[test]
    fn test_init_file_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        assert!(Settings::init_file(&path).unwrap());
        assert!(!Settings::init_file(&path).unwrap());

        let content: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(content["git"]["lang"], "en");
    }

    #[test]
    fn test_merge_removes_null_keys() {
        let mut base = json!({"a": {"b": 1, "c": 2}});
        merge(&mut base, &json!({"a": {"b": null}}));
        assert_eq!(base, json!({"a": {"c": 2}}));
    }
}
