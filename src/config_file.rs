//! Configuration file handling for clisync

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No config file found in current directory or its parents: {0}")]
    ConfigNotFound(PathBuf),
    #[error("Unknown working directory: {0}")]
    UnknownWorkingDirectory(String),
    #[error("Unable to parse YAML config file {path}: {source}")]
    Yaml {
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("Unable to parse JSON config file {path}: {source}")]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("Config area `{0}` not found")]
    MissingArea(String),
    #[error("Invalid config: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("MySQL dump filter `{0}` not available")]
    UnknownFilter(String),
    #[error("Invalid glob pattern `{pattern}`: {source}")]
    Glob {
        source: glob::PatternError,
        pattern: String,
    },
    #[error("Invalid regex pattern `{pattern}`: {source}")]
    Regex {
        source: regex::Error,
        pattern: String,
    },
}

/// File synchronisation settings
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ConfigRsync {
    pub path: Option<String>,
    pub source: Option<String>,
    pub directory: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

/// Remote host reached over ssh
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ConfigSsh {
    pub hostname: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ConfigMysqldump {
    pub option: Option<String>,
}

/// Database synchronisation settings
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ConfigMysql {
    pub database: Option<Vec<String>>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub filter: Option<String>,
    pub mysqldump: Option<ConfigMysqldump>,
}

/// A database as known locally and on the remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabasePair {
    pub local: String,
    pub foreign: String,
}

impl DatabasePair {
    /// Parse `local` or `local:foreign`, trimming whitespace around both names.
    #[must_use]
    pub fn parse(entry: &str) -> Self {
        match entry.split_once(':') {
            Some((local, foreign)) => Self {
                local: local.trim().to_string(),
                foreign: foreign.trim().to_string(),
            },
            None => Self {
                local: entry.trim().to_string(),
                foreign: entry.trim().to_string(),
            },
        }
    }
}

impl ConfigMysql {
    #[must_use]
    pub fn databases(&self) -> Vec<DatabasePair> {
        self.database
            .iter()
            .flatten()
            .filter(|entry| !entry.trim().is_empty())
            .map(|entry| DatabasePair::parse(entry))
            .collect()
    }

    /// Extra `mysqldump` options, passed through unescaped.
    #[must_use]
    pub fn dump_option(&self) -> Option<&str> {
        self.mysqldump
            .as_ref()
            .and_then(|m| m.option.as_deref())
            .filter(|o| !o.trim().is_empty())
    }
}

/// Settings of one config area (`sync`, `share`)
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AreaConfig {
    pub rsync: Option<ConfigRsync>,
    pub ssh: Option<ConfigSsh>,
    pub mysql: Option<ConfigMysql>,
}

/// Database names must be usable unquoted in SQL and as dump file names:
/// non-empty and made of `[A-Za-z0-9_$-]` only.
#[must_use]
pub fn is_valid_database_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '-'))
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

impl AreaConfig {
    /// Remote rsync location: `rsync.path`, or `ssh.hostname:ssh.path`.
    #[must_use]
    pub fn rsync_target(&self) -> Option<String> {
        if let Some(path) = self.rsync.as_ref().and_then(|r| non_empty(r.path.as_ref())) {
            return Some(path.to_string());
        }
        let ssh = self.ssh.as_ref()?;
        let hostname = non_empty(ssh.hostname.as_ref())?;
        let path = non_empty(ssh.path.as_ref())?;
        Some(format!("{hostname}:{path}"))
    }

    /// Host used to wrap remote commands in ssh.
    #[must_use]
    pub fn ssh_hostname(&self) -> Option<&str> {
        self.ssh.as_ref().and_then(|s| non_empty(s.hostname.as_ref()))
    }

    #[must_use]
    pub fn rsync_directories(&self) -> &[String] {
        self.rsync
            .as_ref()
            .and_then(|r| r.directory.as_deref())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn rsync_excludes(&self) -> &[String] {
        self.rsync
            .as_ref()
            .and_then(|r| r.exclude.as_deref())
            .unwrap_or_default()
    }

    /// Check the area before anything runs.
    ///
    /// A missing rsync target is fatal, a missing directory list only disables
    /// file sync.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` listing every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        match self.rsync_target() {
            Some(target) => info!("Using rsync path \"{target}\""),
            None => errors.push("No rsync path configuration found".to_string()),
        }

        if self.rsync_directories().is_empty() {
            warn!("No rsync directory configuration found, filesync disabled");
        }

        if let Some(ref mysql) = self.mysql {
            let databases = mysql.databases();
            if databases.is_empty() {
                errors.push("No mysql database configuration found".to_string());
            }
            for pair in databases {
                if !is_valid_database_name(&pair.local) {
                    errors.push(format!("Invalid database name `{}`", pair.local));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Root configuration structure: named areas plus dump filters
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default, rename = "mysql-backup-filter")]
    pub filters: BTreeMap<String, Vec<String>>,
    #[serde(flatten)]
    pub areas: BTreeMap<String, AreaConfig>,
}

/// List of supported configuration file names
pub const FILENAMES: [&str; 3] = ["clisync.yml", "clisync.yaml", "clisync.json"];

impl Config {
    /// Loads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if the file cannot be read, or
    /// `ConfigError::Yaml`/`ConfigError::Json` if parsing fails.
    pub fn from_file(file: &Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(file)
            .map_err(|_| ConfigError::ConfigNotFound(file.to_path_buf()))?;
        let config: Config = if file.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents).map_err(|e| ConfigError::Json {
                source: e,
                path: file.to_path_buf(),
            })?
        } else {
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Yaml {
                source: e,
                path: file.to_path_buf(),
            })?
        };
        Ok(config)
    }

    /// Searches for a configuration file in the current directory and its parents.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownWorkingDirectory` if the cwd cannot be determined,
    /// or `ConfigError::ConfigNotFound` if no config file is found.
    pub fn find_config() -> Result<PathBuf, ConfigError> {
        let cwd = std::env::current_dir()
            .map_err(|e| ConfigError::UnknownWorkingDirectory(e.to_string()))?;
        Self::find_config_from(&cwd)
    }

    /// Searches for a configuration file in `start` and its parents.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if no config file is found.
    pub fn find_config_from(start: &Path) -> Result<PathBuf, ConfigError> {
        let mut path = start.to_path_buf();
        debug!("Searching for config file in {}", start.display());
        loop {
            for file in &FILENAMES {
                let config_path = path.join(file);
                if config_path.exists() {
                    info!("Found config file: {}", config_path.display());
                    return Ok(config_path);
                }
            }
            if !path.pop() {
                return Err(ConfigError::ConfigNotFound(start.to_path_buf()));
            }
        }
    }

    /// Settings of the named area.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingArea` if the file has no such section.
    pub fn area(&self, name: &str) -> Result<&AreaConfig, ConfigError> {
        self.areas
            .get(name)
            .ok_or_else(|| ConfigError::MissingArea(name.to_string()))
    }
}
