//! Configuration management for standfast.
//!
//! Configuration is read from `~/.config/standfast/config.toml` at startup
//! (or the path given with `--config`). If the file doesn't exist, a default
//! configuration with comments is created.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{ArtifactFormat, TargetSpec, RESERVED_FIELDS};
use crate::fetcher::{BrowserSettings, FetchConfig};
use crate::remote::RemoteConfig;
use crate::targets::builtin_targets;

/// Main configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where artifacts are written
    pub output_dir: PathBuf,
    /// Where fingerprint stores live
    pub state_dir: PathBuf,
    pub fetch: FetchConfig,
    pub browser: BrowserSettings,
    pub server: ServerConfig,
    pub remote: RemoteConfig,
    /// Extra targets, or replacements for built-ins with the same name
    pub targets: Vec<TargetSpec>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("standfast");

        Self {
            output_dir: data_dir.join("output"),
            state_dir: data_dir.join("state"),
            fetch: FetchConfig::default(),
            browser: BrowserSettings::default(),
            server: ServerConfig::default(),
            remote: RemoteConfig::default(),
            targets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the trigger server listens on (default: 127.0.0.1:8000)
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_config_path()?)
    }

    /// Load configuration from `path`.
    ///
    /// If the file doesn't exist, creates a default one with comments.
    /// Missing fields use default values; the result is validated.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            Self::create_default_config(path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path: `~/.config/standfast/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("standfast").join("config.toml"))
    }

    /// Built-in targets with configured ones merged in by name.
    pub fn targets(&self) -> Vec<TargetSpec> {
        let mut targets = builtin_targets();
        for custom in &self.targets {
            match targets.iter_mut().find(|t| t.name == custom.name) {
                Some(existing) => *existing = custom.clone(),
                None => targets.push(custom.clone()),
            }
        }
        targets
    }

    pub fn fingerprint_path(&self, target: &str) -> PathBuf {
        self.state_dir.join(format!("{}.fingerprints.json", target))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for target in &self.targets {
            let valid_name = !target.name.is_empty()
                && target
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid_name {
                return Err(ConfigError::Invalid(format!(
                    "target name '{}' may only contain letters, digits, '-' and '_'",
                    target.name
                )));
            }
            if !names.insert(target.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "target '{}' is defined twice",
                    target.name
                )));
            }
            if target.rollup && target.format != ArtifactFormat::Json {
                return Err(ConfigError::Invalid(format!(
                    "target '{}': rollup needs format = \"json\"",
                    target.name
                )));
            }
            Self::validate_field_names(target)?;
        }
        Ok(())
    }

    /// Record fields are flattened next to the record's own keys, so every
    /// top-level name must be unique and unreserved.
    fn validate_field_names(target: &TargetSpec) -> Result<(), ConfigError> {
        let mut fields = HashSet::new();
        for name in target.field_names() {
            if RESERVED_FIELDS.contains(&name) {
                return Err(ConfigError::Invalid(format!(
                    "target '{}': field name '{}' is reserved",
                    target.name, name
                )));
            }
            if !fields.insert(name) {
                return Err(ConfigError::Invalid(format!(
                    "target '{}': field '{}' is defined twice",
                    target.name, name
                )));
            }
        }
        Ok(())
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# standfast configuration
#
# Artifacts and fingerprint stores default to the platform data directory
# (e.g. ~/.local/share/standfast/output and .../state).
# output_dir = "/srv/standfast/output"
# state_dir = "/srv/standfast/state"

[fetch]
# Request timeout in seconds
timeout_secs = 30

# Total attempts per page, first try included
max_attempts = 2

# First retry delay in milliseconds, doubled per attempt up to max_backoff_ms
backoff_ms = 500
max_backoff_ms = 8000

[browser]
# Run Chrome without a visible window
headless = true

# Navigation timeout in seconds
timeout_secs = 30

# How long to wait for a page's content marker, in seconds
wait_timeout_secs = 10

# How long to look for each cookie/terms overlay button, in milliseconds
dismiss_wait_ms = 3000

# Extra wait after load for dynamic content, in milliseconds
settle_ms = 500

[server]
bind = "127.0.0.1:8000"

# Remote sync uses Google Drive when GDRIVE_FOLDER_ID and
# GOOGLE_SERVICE_ACCOUNT_BASE64 are set. Set a directory here to mirror
# artifacts into a local or mounted folder instead.
[remote]
# directory = "/mnt/share/standfast"

# Built-in targets: archive, judges, critiques. Add more, or replace one by
# reusing its name:
#
# [[targets]]
# name = "results"
# identity = { kind = "query", param = "id" }
# rollup = true
#
# [targets.listing]
# kind = "html"
# url = "https://example.org/results"
# anchor = "li.result"
#
# [targets.detail]
# anchor = "main"
# fields = [
#   { name = "title", selector = "h1", default = "No title" },
# ]
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
