//! Backup and restore workflows
//!
//! Each workflow validates its config area, creates the temp workspace, runs
//! its steps in order and removes the workspace again on every exit path.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::config_file::{AreaConfig, Config, ConfigError};
use crate::mysql::MysqlError;
use crate::shell::{CommandBuilder, ExecError, Executor, ProcessRunner};
use crate::workspace::TempWorkspace;

pub mod backup;
pub mod restore;
pub mod share;

pub use backup::Backup;
pub use restore::Restore;
pub use share::Share;

/// Share subdirectory holding database dumps
pub const PATH_DUMP: &str = "dump";
/// Share subdirectory holding project files
pub const PATH_DATA: &str = "data";

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Mysql(#[from] MysqlError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SyncError {
    /// Process exit code to report: the failed command's status if there is
    /// one, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::Exec(e) => e.exit_code().unwrap_or(1),
            SyncError::Mysql(e) => e.exit_code(),
            SyncError::Config(_) | SyncError::Io(_) => 1,
        }
    }
}

/// Everything a workflow needs to run, read once per invocation.
pub struct SyncContext<'a> {
    /// Directory holding the config file, the local side of file syncs
    pub working_path: PathBuf,
    pub area: AreaConfig,
    pub filters: BTreeMap<String, Vec<String>>,
    /// Executable used for `mysql:*` self invocations
    pub self_exe: PathBuf,
    /// Parent of the per-process temp directory
    pub temp_base: PathBuf,
    /// Passed on to self invocations as `--config`
    pub config_file: Option<PathBuf>,
    /// Passed on to self invocations as `--log-file`
    pub log_file: Option<PathBuf>,
    pub runner: &'a dyn ProcessRunner,
}

impl<'a> SyncContext<'a> {
    /// Build a context for `area` from a parsed config.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingArea` if the config has no such area.
    pub fn new(
        config: &Config,
        area: &str,
        working_path: PathBuf,
        runner: &'a dyn ProcessRunner,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            working_path,
            area: config.area(area)?.clone(),
            filters: config.filters.clone(),
            self_exe: std::env::current_exe().unwrap_or_else(|e| {
                warn!("Cannot determine own executable ({e}), using `clisync` from PATH");
                PathBuf::from("clisync")
            }),
            temp_base: std::env::temp_dir(),
            config_file: None,
            log_file: None,
            runner,
        })
    }

    /// `SELF <subcommand> <arguments>`
    fn self_command(&self, subcommand: &str, arguments: &[&str]) -> CommandBuilder {
        CommandBuilder::for_self(&self.self_exe, subcommand)
            .with_argument_list(arguments.iter().copied())
    }

    /// Hand the config and log file of this run on to a self invocation.
    fn forward_options(&self, command: &mut CommandBuilder) {
        if let Some(ref config_file) = self.config_file {
            command.add_argument_template("--config=%s", &[config_file.to_string_lossy().as_ref()]);
        }
        if let Some(ref log_file) = self.log_file {
            command.add_argument_template("--log-file=%s", &[log_file.to_string_lossy().as_ref()]);
        }
    }

    /// `SELF mysql:restore <database> <file>`
    #[must_use]
    pub fn mysql_restore_command(&self, database: &str, dump_file: &Path) -> CommandBuilder {
        let mut command =
            self.self_command("mysql:restore", &[database, dump_file.to_string_lossy().as_ref()]);
        self.forward_options(&mut command);
        command
    }

    /// `SELF mysql:backup <database> <file> [--filter=<name>]`
    #[must_use]
    pub fn mysql_backup_command(
        &self,
        database: &str,
        dump_file: &Path,
        filter: Option<&str>,
    ) -> CommandBuilder {
        let mut command =
            self.self_command("mysql:backup", &[database, dump_file.to_string_lossy().as_ref()]);
        if let Some(filter) = filter {
            command.add_argument_template("--filter=%s", &[filter]);
        }
        self.forward_options(&mut command);
        command
    }
}

/// A sync subcommand
pub trait Workflow {
    /// Config area the workflow reads
    const AREA: &'static str;

    /// Run the workflow steps. The workspace outlives this call.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error; later steps are not run.
    fn run_task(ctx: &SyncContext<'_>, workspace: &TempWorkspace) -> Result<(), SyncError>;
}

/// Validate, start up, run and clean up one workflow.
///
/// # Errors
///
/// Returns `SyncError::Config` if validation fails (nothing is run), or the
/// error of the failing step after the temp directory has been removed.
pub fn run<W: Workflow>(ctx: &SyncContext<'_>) -> Result<(), SyncError> {
    ctx.area.validate()?;
    let workspace = TempWorkspace::create(&ctx.temp_base)?;
    W::run_task(ctx, &workspace)
}

/// rsync from `source` to `target` with optional `--files-from` and
/// `--exclude-from` lists written into the workspace.
///
/// The list files are removed once the command has run.
///
/// # Errors
///
/// Returns an `io::Error` if a list file cannot be written.
pub fn rsync_command(
    workspace: &TempWorkspace,
    source: &str,
    target: &str,
    filelist: &[String],
    exclude: &[String],
) -> io::Result<Executor<'static>> {
    info!("Rsync from {source} to {target}");

    let mut command =
        CommandBuilder::new("rsync").with_argument_raw("-rlptD --delete-after --progress -h");
    let mut list_files = Vec::new();

    if !filelist.is_empty() {
        let path = workspace.path().join(".rsync-filelist");
        std::fs::write(&path, filelist.join("\n"))?;
        command.add_argument_template("--files-from=%s", &[path.to_string_lossy().as_ref()]);
        list_files.push(path);
    }

    if !exclude.is_empty() {
        let path = workspace.path().join(".rsync-exclude");
        std::fs::write(&path, exclude.join("\n"))?;
        command.add_argument_template("--exclude-from=%s", &[path.to_string_lossy().as_ref()]);
        list_files.push(path);
    }

    command
        .add_argument(with_trailing_slash(source))
        .add_argument(with_trailing_slash(target));

    let mut executor = Executor::new(command);
    for path in list_files {
        executor.add_finisher_callback(move || {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Failed to remove {}: {e}", path.display());
            }
        });
    }
    Ok(executor)
}

/// Exactly one trailing slash, so rsync syncs directory contents.
fn with_trailing_slash(path: &str) -> String {
    format!("{}/", path.trim_end_matches('/'))
}
