//! Loader and host configuration.
//!
//! Defaults and environment variable names live in their own modules so the
//! library and the `hotbind` binary agree on them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};
use crate::manifest::PluginEntry;
use crate::platform::ModuleLocator;

/// Default values.
pub mod defaults {
    /// Directory searched for plugin modules when nothing else is configured.
    pub const BASE_DIRECTORY: &str = "plugins";
    /// Debounce window for file watch events.
    pub const DEBOUNCE_MS: u64 = 500;
}

/// Environment variable names.
pub mod env_vars {
    pub const PLUGIN_DIR: &str = "HOTBIND_PLUGIN_DIR";
    pub const PLUGIN_EXT: &str = "HOTBIND_PLUGIN_EXT";
    pub const LOG_JSON: &str = "HOTBIND_LOG_JSON";

    /// Whether JSON log output was requested.
    pub fn log_json() -> bool {
        std::env::var(LOG_JSON)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false)
    }
}

/// Where plugin modules live and how their files are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default = "default_base_directory")]
    pub base_directory: PathBuf,

    /// Library extension without the dot. `None` means the platform default.
    #[serde(default)]
    pub extension: Option<String>,
}

fn default_base_directory() -> PathBuf {
    PathBuf::from(defaults::BASE_DIRECTORY)
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_directory: default_base_directory(),
            extension: None,
        }
    }
}

impl LoaderConfig {
    pub fn new(base_directory: impl Into<PathBuf>) -> Self {
        Self {
            base_directory: base_directory.into(),
            extension: None,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Apply `HOTBIND_PLUGIN_DIR` / `HOTBIND_PLUGIN_EXT` overrides.
    pub fn with_env(self) -> Self {
        self.with_overrides(
            std::env::var(env_vars::PLUGIN_DIR).ok(),
            std::env::var(env_vars::PLUGIN_EXT).ok(),
        )
    }

    /// Apply overrides; empty values are ignored.
    pub fn with_overrides(mut self, base_directory: Option<String>, extension: Option<String>) -> Self {
        if let Some(dir) = base_directory.filter(|d| !d.trim().is_empty()) {
            self.base_directory = PathBuf::from(dir);
        }
        if let Some(ext) = extension.filter(|e| !e.trim().is_empty()) {
            self.extension = Some(ext);
        }
        self
    }

    pub fn locator(&self) -> ModuleLocator {
        match &self.extension {
            Some(ext) => ModuleLocator::new(&self.base_directory, ext.as_str()),
            None => ModuleLocator::native(&self.base_directory),
        }
    }
}

/// Configuration file for a host process: loader settings plus the
/// externally declared plugins.
///
/// ```toml
/// base_directory = "target/debug"
/// debounce_ms = 250
///
/// [[plugins]]
/// name = "geo"
/// symbols = ["get_position", "get_color"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(flatten)]
    pub loader: LoaderConfig,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
}

fn default_debounce_ms() -> u64 {
    defaults::DEBOUNCE_MS
}

impl HostConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| LoadError::config(format!("invalid TOML: {}", e)))
    }

    /// Load a config file. A relative `base_directory` is resolved against
    /// the directory containing the file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoadError::config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_toml_str(&content)?;
        if config.loader.base_directory.is_relative() {
            if let Some(parent) = path.parent() {
                config.loader.base_directory = parent.join(&config.loader.base_directory);
            }
        }
        Ok(config)
    }

    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}
