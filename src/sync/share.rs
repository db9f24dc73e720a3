use log::info;

use crate::filter::TableFilter;
use crate::mysql;
use crate::shell::Executor;
use crate::sync::restore::share_target;
use crate::sync::{PATH_DATA, PATH_DUMP, SyncContext, SyncError, Workflow, rsync_command};
use crate::workspace::TempWorkspace;

/// `sync:share`: publish local files and databases to the shared dump location
pub struct Share;

impl Workflow for Share {
    const AREA: &'static str = "share";

    fn run_task(ctx: &SyncContext<'_>, workspace: &TempWorkspace) -> Result<(), SyncError> {
        let share = share_target(ctx)?;
        let filter = ctx
            .area
            .mysql
            .as_ref()
            .and_then(|m| m.filter.as_deref())
            .filter(|f| !f.trim().is_empty());
        if let Some(name) = filter {
            // Fail before anything runs; the backup subcommand resolves it again
            TableFilter::resolve(name, &ctx.filters)?;
        }

        rsync_command(
            workspace,
            &ctx.working_path.to_string_lossy(),
            &format!("{share}/{PATH_DATA}"),
            ctx.area.rsync_directories(),
            ctx.area.rsync_excludes(),
        )?
        .execute_interactive(ctx.runner)?;

        let databases = ctx
            .area
            .mysql
            .as_ref()
            .map(crate::config_file::ConfigMysql::databases)
            .unwrap_or_default();
        if databases.is_empty() {
            return Ok(());
        }

        for pair in databases {
            mysql::validate_database_name(&pair.local)?;
            let dump_file = workspace.mysql_dir().join(format!("{}.sql.bz2", pair.local));
            info!("Dumping database {}", pair.local);
            Executor::new(ctx.mysql_backup_command(&pair.local, &dump_file, filter))
                .execute_interactive(ctx.runner)?;
        }

        rsync_command(
            workspace,
            &workspace.path().to_string_lossy(),
            &format!("{share}/{PATH_DUMP}"),
            &[],
            &[],
        )?
        .execute_interactive(ctx.runner)?;
        Ok(())
    }
}
