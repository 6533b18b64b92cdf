//! Discovering provider plugins on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::PluginError;

use super::external::ExternalProvider;
use super::{Model, ModelMetrics, Provider, validate_models};

/// File describing a plugin inside its directory.
pub const MANIFEST_FILE: &str = "provider.json";

/// Turns a plugins directory into providers.
///
/// Implementations skip candidates that fail validation instead of failing the
/// whole load.
#[cfg_attr(test, mockall::automock)]
pub trait PluginLoader: Send + Sync {
    fn load_from_directory(&self, dir: &Path) -> Vec<Arc<dyn Provider>>;
}

/// Loads `<dir>/<plugin>/provider.json` manifests as [`ExternalProvider`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestLoader;

impl PluginLoader for ManifestLoader {
    fn load_from_directory(&self, dir: &Path) -> Vec<Arc<dyn Provider>> {
        let candidates = match plugin_dirs(dir) {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!("{e}; no plugins loaded");
                return Vec::new();
            }
        };

        let mut providers: Vec<Arc<dyn Provider>> = Vec::new();
        for candidate in candidates {
            match load_provider(&candidate) {
                Ok(provider) => {
                    debug!("Loaded provider '{}' from {}", provider.id, candidate.display());
                    providers.push(Arc::new(provider));
                }
                Err(e) => warn!("Skipping plugin {}: {e}", candidate.display()),
            }
        }
        providers
    }
}

/// Immediate subdirectories of `dir`, sorted by name.
fn plugin_dirs(dir: &Path) -> Result<Vec<PathBuf>, PluginError> {
    let read_err = |source| PluginError::DirectoryRead {
        path: dir.to_path_buf(),
        source,
    };

    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if entry.file_type().map_err(read_err)?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Read and validate one plugin directory.
pub fn load_provider(plugin_dir: &Path) -> Result<ExternalProvider, PluginError> {
    let path = plugin_dir.join(MANIFEST_FILE);
    let content = fs::read_to_string(&path).map_err(|source| PluginError::ManifestRead {
        path: path.clone(),
        source,
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|source| PluginError::ManifestParse {
        path: path.clone(),
        source,
    })?;

    let mut provider = parse_manifest(&path, &value)?;
    provider.dir = plugin_dir.to_path_buf();
    Ok(provider)
}

/// Check every required field of a manifest, naming the first offender.
fn parse_manifest(path: &Path, value: &Value) -> Result<ExternalProvider, PluginError> {
    let root = value.as_object().ok_or_else(|| invalid(path, "<root>", "an object"))?;

    let id = required_str(path, root, "id", "")?;
    if id.trim().is_empty() {
        return Err(invalid(path, "id", "a non-empty string"));
    }
    let display_name = required_str(path, root, "displayName", "")?;
    let description = required_str(path, root, "description", "")?;
    let command = required_str(path, root, "command", "")?;

    let args = match root.get("args") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(path, &format!("args[{i}]"), "a string"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(invalid(path, "args", "an array of strings")),
    };

    let timeout = match root.get("timeoutSecs") {
        None => None,
        Some(v) => Some(Duration::from_secs(
            v.as_u64()
                .ok_or_else(|| invalid(path, "timeoutSecs", "a non-negative integer"))?,
        )),
    };

    let models = root
        .get("models")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid(path, "models", "an array"))?
        .iter()
        .enumerate()
        .map(|(i, model)| parse_model(path, &id, i, model))
        .collect::<Result<Vec<_>, _>>()?;

    validate_models(&id, &models)?;

    Ok(ExternalProvider {
        id,
        display_name,
        description,
        models,
        command,
        args,
        timeout,
        dir: PathBuf::new(),
    })
}

fn parse_model(path: &Path, provider_id: &str, index: usize, value: &Value) -> Result<Model, PluginError> {
    let prefix = format!("models[{index}].");
    let obj = value
        .as_object()
        .ok_or_else(|| invalid(path, &format!("models[{index}]"), "an object"))?;

    let provider_id = match obj.get("providerId") {
        None => provider_id.to_string(),
        Some(_) => required_str(path, obj, "providerId", &prefix)?,
    };

    let metrics = match obj.get("metrics") {
        None | Some(Value::Null) => None,
        Some(Value::Object(m)) => Some(ModelMetrics {
            accuracy: unit_number(path, m, "accuracy", &prefix)?,
            speed: unit_number(path, m, "speed", &prefix)?,
            cost: unit_number(path, m, "cost", &prefix)?,
        }),
        Some(_) => return Err(invalid(path, &format!("{prefix}metrics"), "an object")),
    };

    Ok(Model {
        provider_id,
        id: required_str(path, obj, "id", &prefix)?,
        name: required_str(path, obj, "name", &prefix)?,
        description: required_str(path, obj, "description", &prefix)?,
        metrics,
    })
}

fn required_str(path: &Path, obj: &Map<String, Value>, field: &str, prefix: &str) -> Result<String, PluginError> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| invalid(path, &format!("{prefix}{field}"), "a string"))
}

fn unit_number(path: &Path, obj: &Map<String, Value>, field: &str, prefix: &str) -> Result<f64, PluginError> {
    obj.get(field)
        .and_then(Value::as_f64)
        .filter(|n| (0.0..=1.0).contains(n))
        .ok_or_else(|| invalid(path, &format!("{prefix}metrics.{field}"), "a number between 0 and 1"))
}

fn invalid(path: &Path, field: &str, expected: &'static str) -> PluginError {
    PluginError::InvalidField {
        path: path.to_path_buf(),
        field: field.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest() -> Value {
        json!({
            "id": "acme",
            "displayName": "Acme",
            "description": "Acme models",
            "command": "./generate",
            "models": [{
                "id": "acme/fast",
                "name": "Fast",
                "description": "quick",
                "metrics": {"accuracy": 0.8, "speed": 0.9, "cost": 0.2}
            }]
        })
    }

    fn write_plugin(root: &Path, name: &str, manifest: &Value) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE), manifest.to_string()).unwrap();
    }

    fn field_of(err: PluginError) -> String {
        match err {
            PluginError::InvalidField { field, .. } => field,
            other => panic!("Expected InvalidField, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_valid_manifest() {
        let provider = parse_manifest(Path::new("p.json"), &manifest()).unwrap();
        assert_eq!(provider.id, "acme");
        assert_eq!(provider.models[0].provider_id, "acme");
        assert_eq!(provider.models[0].metrics.map(|m| m.speed), Some(0.9));
        assert!(provider.args.is_empty());
        assert!(provider.timeout.is_none());
    }

    #[test]
    fn test_missing_display_name_is_named() {
        let mut value = manifest();
        value.as_object_mut().unwrap().remove("displayName");
        let err = parse_manifest(Path::new("p.json"), &value).unwrap_err();
        assert_eq!(field_of(err), "displayName");
    }

    #[test]
    fn test_models_must_be_array() {
        let mut value = manifest();
        value["models"] = json!("acme/fast");
        let err = parse_manifest(Path::new("p.json"), &value).unwrap_err();
        assert_eq!(field_of(err), "models");
    }

    #[test]
    fn test_model_field_path_in_error() {
        let mut value = manifest();
        value["models"][0]["name"] = json!(7);
        let err = parse_manifest(Path::new("p.json"), &value).unwrap_err();
        assert_eq!(field_of(err), "models[0].name");
    }

    #[test]
    fn test_metrics_out_of_range() {
        let mut value = manifest();
        value["models"][0]["metrics"]["cost"] = json!(3.5);
        let err = parse_manifest(Path::new("p.json"), &value).unwrap_err();
        assert_eq!(field_of(err), "models[0].metrics.cost");
    }

    #[test]
    fn test_foreign_provider_id_rejected() {
        let mut value = manifest();
        value["models"][0]["providerId"] = json!("other");
        assert!(matches!(
            parse_manifest(Path::new("p.json"), &value),
            Err(PluginError::ModelProviderMismatch { .. })
        ));
    }

    #[test]
    fn test_load_directory_skips_bad_plugins() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(root.path(), "a-good", &manifest());

        let mut bad = manifest();
        bad["id"] = json!(42);
        write_plugin(root.path(), "b-bad", &bad);

        fs::create_dir_all(root.path().join("c-empty")).unwrap();
        fs::write(root.path().join("stray.txt"), "ignored").unwrap();

        let providers = ManifestLoader.load_from_directory(root.path());
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].id(), "acme");
    }

    #[test]
    fn test_load_sets_plugin_dir() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(root.path(), "acme", &manifest());
        let provider = load_provider(&root.path().join("acme")).unwrap();
        assert_eq!(provider.dir(), root.path().join("acme"));
    }

    #[test]
    fn test_missing_directory_loads_nothing() {
        let root = tempfile::tempdir().unwrap();
        let providers = ManifestLoader.load_from_directory(&root.path().join("absent"));
        assert!(providers.is_empty());
    }
}
