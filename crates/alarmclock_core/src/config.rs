//! Host configuration for the alarm core.
//!
//! # Responsibility
//! - Resolve database and log locations plus the log level.
//! - Load and save the TOML configuration file.
//!
//! # Invariants
//! - Fields missing from a config file fall back to platform defaults.
//! - Loading never panics; unreadable or malformed files are errors.

use crate::logging::default_log_level;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// File name of the alarm database inside the data directory.
pub const DB_FILE_NAME: &str = "alarms.sqlite3";

const CONFIG_FILE_NAME: &str = "config.toml";
const APPLICATION: &str = "alarmclock";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "config file `{}` is not accessible: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config file: {err}"),
            Self::Serialize(err) => write!(f, "config cannot be serialized: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Serialize(err) => Some(err),
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialize(value)
    }
}

/// Core runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Directory receiving rolling log files. Must be absolute.
    pub log_dir: PathBuf,
    /// One of `trace|debug|info|warn|error`.
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let (data_dir, log_dir) = match project_dirs() {
            Some(dirs) => (
                dirs.data_dir().to_path_buf(),
                dirs.data_local_dir().join("logs"),
            ),
            None => {
                let fallback = std::env::temp_dir().join(APPLICATION);
                (fallback.clone(), fallback.join("logs"))
            }
        };

        Self {
            db_path: data_dir.join(DB_FILE_NAME),
            log_dir,
            log_level: default_log_level().to_string(),
        }
    }
}

impl CoreConfig {
    /// Platform config file location, e.g. `~/.config/alarmclock/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Reads and parses a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&raw)?)
    }

    /// Like `load`, but a missing file yields defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Writes this config as TOML, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        let raw = toml::to_string(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        std::fs::write(path, raw).map_err(io_error)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APPLICATION)
}
