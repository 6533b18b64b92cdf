//! Per-user locations for settings and provider plugins.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Environment variable overriding the commitdeck home directory.
pub const HOME_ENV_VAR: &str = "COMMITDECK_HOME";

const APP_DIR: &str = "commitdeck";
const CONFIG_FILE: &str = "config.json";
const PROVIDERS_DIR: &str = "providers";

/// Resolved on-disk layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    home: PathBuf,
}

impl AppPaths {
    /// Resolve from `COMMITDECK_HOME`, falling back to `<config dir>/commitdeck`.
    pub fn resolve() -> Result<Self, ConfigError> {
        match env::var_os(HOME_ENV_VAR) {
            Some(home) if !home.is_empty() => Ok(Self::at(PathBuf::from(home))),
            _ => dirs::config_dir()
                .map(|dir| Self::at(dir.join(APP_DIR)))
                .ok_or(ConfigError::NoConfigDir),
        }
    }

    pub fn at(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config_file(&self) -> PathBuf {
        self.home.join(CONFIG_FILE)
    }

    pub fn providers_dir(&self) -> PathBuf {
        self.home.join(PROVIDERS_DIR)
    }

    /// Create the home and providers directories if missing.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        let providers = self.providers_dir();
        std::fs::create_dir_all(&providers).map_err(|source| ConfigError::WriteFailed {
            path: providers,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_resolve_uses_home_override() {
        temp_env::with_var(HOME_ENV_VAR, Some("/tmp/commitdeck-home"), || {
            let paths = AppPaths::resolve().unwrap();
            assert_eq!(paths.home(), Path::new("/tmp/commitdeck-home"));
            assert_eq!(paths.config_file(), Path::new("/tmp/commitdeck-home/config.json"));
            assert_eq!(paths.providers_dir(), Path::new("/tmp/commitdeck-home/providers"));
        });
    }

    #[test]
    #[serial]
    fn test_resolve_ignores_empty_override() {
        temp_env::with_var(HOME_ENV_VAR, Some(""), || {
            if let Ok(paths) = AppPaths::resolve() {
                assert!(paths.home().ends_with(APP_DIR));
            }
        });
    }

    #[test]
    fn test_ensure_dirs_creates_providers_dir() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::at(dir.path().join("nested"));
        paths.ensure_dirs().unwrap();
        assert!(paths.providers_dir().is_dir());
    }
}
