//! Configuration handling for tagfs.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Mount configuration
    #[serde(default)]
    pub mount: MountConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Mount-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct MountConfig {
    /// Allow other users to access the mount
    #[serde(default)]
    pub allow_other: bool,
}

/// Which database commands use when none is given.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Database file
    pub path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    /// The configured level; unknown names fall back to `INFO`.
    pub fn level(&self) -> Level {
        self.level.parse().unwrap_or(Level::INFO)
    }
}

impl Config {
    /// Load from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from `path`, or the default location when `None`.
    ///
    /// A missing file yields the defaults.
    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        let Some(path) = path.or_else(Self::config_path) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config in {}", path.display()))
    }

    fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Default config file location.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Annotated sample configuration.
    pub fn sample_toml() -> &'static str {
        r#"# tagfs configuration

[mount]
# Allow other users to access the mount (needs user_allow_other in /etc/fuse.conf)
allow_other = false

[database]
# Database used when neither --database nor TAGFS_DB is given
# path = "/home/me/.tagfs/db.json"

[logging]
# One of: trace, debug, info, warn, error
level = "info"
"#
    }
}

/// Get the XDG data directory for tagfs.
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("TAGFS_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "tagfs").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the XDG config directory for tagfs.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("TAGFS_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "tagfs").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the XDG cache directory for tagfs.
pub fn cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "tagfs").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// The nearest `.tagfs/db.json` in `start` or one of its ancestors.
pub fn find_repository(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(tagfs_imply::REPOSITORY_DIR).join("db.json"))
        .find(|candidate| candidate.is_file())
}
