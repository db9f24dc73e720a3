//! Core implementation of clisync
//!
//! clisync pulls project files and MySQL databases from a live server (or a
//! shared dump location) into a local working copy. The transfers are done by
//! `rsync`, `mysqldump`, `mysql`, `bzip2` and `ssh`; this crate builds their
//! command lines from a `clisync.yml` project file and runs them in order.

use std::path::PathBuf;

use log::debug;

use crate::config_file::{Config, ConfigError};

pub mod config_file;
pub mod filter;
pub mod logger;
pub mod mysql;
pub mod shell;
pub mod sync;
pub mod workspace;

/// Load configuration from a file (or auto-detect), returning the config, the
/// project working path and the config file path.
///
/// # Errors
///
/// Returns `ConfigError` if the config file is not found or cannot be parsed.
pub fn load_config(config_file: Option<&str>) -> Result<(Config, PathBuf, PathBuf), ConfigError> {
    let config_path = match config_file {
        Some(file) => {
            let config_path = PathBuf::from(file);
            if !config_path.exists() {
                return Err(ConfigError::ConfigNotFound(config_path));
            }
            config_path
        }
        None => Config::find_config()?,
    };
    let cwd = config_path
        .parent()
        .ok_or_else(|| ConfigError::ConfigNotFound(config_path.clone()))?
        .to_path_buf();
    // A bare file name has an empty parent
    let cwd = if cwd.as_os_str().is_empty() {
        std::env::current_dir().map_err(|e| ConfigError::UnknownWorkingDirectory(e.to_string()))?
    } else {
        cwd
    };
    debug!(
        "Loading config file: {} (working path: {})",
        config_path.display(),
        cwd.display()
    );
    let config = Config::from_file(&config_path)?;
    Ok((config, cwd, config_path))
}
