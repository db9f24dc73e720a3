use std::path::PathBuf;

use log::{info, warn};

use crate::config_file::ConfigError;
use crate::shell::Executor;
use crate::sync::{PATH_DATA, PATH_DUMP, SyncContext, SyncError, Workflow, rsync_command};
use crate::workspace::TempWorkspace;

/// `sync:restore`: restore files and databases from the shared dump location
pub struct Restore;

impl Workflow for Restore {
    const AREA: &'static str = "share";

    fn run_task(ctx: &SyncContext<'_>, workspace: &TempWorkspace) -> Result<(), SyncError> {
        let share = share_target(ctx)?;
        let working_path = ctx.working_path.to_string_lossy();

        // Project files
        rsync_command(
            workspace,
            &format!("{share}/{PATH_DATA}"),
            &working_path,
            ctx.area.rsync_directories(),
            ctx.area.rsync_excludes(),
        )?
        .execute_interactive(ctx.runner)?;

        // Database dumps land in <tmp>/mysql/
        rsync_command(
            workspace,
            &format!("{share}/{PATH_DUMP}"),
            &workspace.path().to_string_lossy(),
            &[],
            &[],
        )?
        .execute_interactive(ctx.runner)?;

        for (database, dump_file) in dump_files(workspace)? {
            info!("Restoring database {database}");
            Executor::new(ctx.mysql_restore_command(&database, &dump_file))
                .execute_interactive(ctx.runner)?;
        }
        Ok(())
    }
}

/// The share location, without trailing slash.
pub(crate) fn share_target(ctx: &SyncContext<'_>) -> Result<String, ConfigError> {
    ctx.area
        .rsync_target()
        .map(|t| t.trim_end_matches('/').to_string())
        .ok_or_else(|| {
            ConfigError::Validation(vec!["No rsync path configuration found".to_string()])
        })
}

/// Dump files in the workspace, sorted by name, with the database name taken
/// from the file name up to the first `.`.
fn dump_files(workspace: &TempWorkspace) -> std::io::Result<Vec<(String, PathBuf)>> {
    let dir = workspace.mysql_dir();
    if !dir.is_dir() {
        warn!("No database dumps found in {}", dir.display());
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let database = name.split('.').next().unwrap_or_default();
        if database.is_empty() {
            continue;
        }
        files.push((database.to_string(), entry.path()));
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}
