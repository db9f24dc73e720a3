use log::info;

use crate::config_file::ConfigMysql;
use crate::filter::TableFilter;
use crate::mysql::{self, Credentials, table_list_command};
use crate::shell::{Command, CommandBuilder, Executor};
use crate::sync::{SyncContext, SyncError, Workflow, rsync_command};
use crate::workspace::TempWorkspace;

/// `sync:sync`: pull files and databases from the live server
pub struct Backup;

impl Workflow for Backup {
    const AREA: &'static str = "sync";

    fn run_task(ctx: &SyncContext<'_>, workspace: &TempWorkspace) -> Result<(), SyncError> {
        // Resolved up front so an unknown filter aborts before any transfer
        let filter = ctx
            .area
            .mysql
            .as_ref()
            .and_then(|m| m.filter.as_deref())
            .filter(|f| !f.trim().is_empty())
            .map(|name| TableFilter::resolve(name, &ctx.filters))
            .transpose()?;

        if ctx.area.rsync.is_some() {
            sync_files(ctx, workspace)?;
        }

        if let Some(ref mysql) = ctx.area.mysql
            && !mysql.databases().is_empty()
        {
            sync_databases(ctx, workspace, mysql, filter.as_ref())?;
        }
        Ok(())
    }
}

fn sync_files(ctx: &SyncContext<'_>, workspace: &TempWorkspace) -> Result<(), SyncError> {
    let source = ctx
        .area
        .rsync
        .as_ref()
        .and_then(|r| r.source.clone())
        .filter(|s| !s.trim().is_empty())
        .or_else(|| ctx.area.rsync_target())
        .unwrap_or_default();
    let target = ctx.working_path.to_string_lossy();

    rsync_command(
        workspace,
        &source,
        &target,
        ctx.area.rsync_directories(),
        ctx.area.rsync_excludes(),
    )?
    .execute_interactive(ctx.runner)?;
    Ok(())
}

fn sync_databases(
    ctx: &SyncContext<'_>,
    workspace: &TempWorkspace,
    mysql: &ConfigMysql,
    filter: Option<&TableFilter>,
) -> Result<(), SyncError> {
    let client = Credentials::from_config(mysql).client("mysql");

    let mut dump_template = client.clone();
    dump_template
        .set_program("mysqldump")
        .add_pipe_command(
            CommandBuilder::new("bzip2").with_argument_raw("--compress --stdout"),
        );
    if let Some(option) = mysql.dump_option() {
        dump_template.add_argument_raw(option);
    }

    for pair in mysql.databases() {
        mysql::validate_database_name(&pair.local)?;
        let dump_file = workspace.mysql_dir().join(format!("{}.sql.bz2", pair.local));

        info!("Fetching foreign database {}", pair.foreign);
        let dump = dump_template.clone().with_argument(&pair.foreign);
        let command = match filter {
            Some(filter) => {
                let query = Command::from(table_list_command(&client, &pair.foreign))
                    .wrap_remote(ctx.area.ssh_hostname());
                mysql::apply_filter(&dump, query, filter, ctx.runner)?
            }
            None => Command::from(dump),
        };
        Executor::new(
            command
                .wrap_remote(ctx.area.ssh_hostname())
                .redirect_to(&dump_file),
        )
        .execute_interactive(ctx.runner)?;

        info!("Restoring database {}", pair.local);
        Executor::new(ctx.mysql_restore_command(&pair.local, &dump_file))
            .execute_interactive(ctx.runner)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config_file::Config;
    use crate::shell::Mode;
    use crate::sync::run;
    use crate::sync::testing::Recorder;

    fn context<'a>(yaml: &str, runner: &'a Recorder, base: &std::path::Path) -> SyncContext<'a> {
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let mut ctx = SyncContext::new(&config, "sync", PathBuf::from("/work"), runner).unwrap();
        ctx.self_exe = PathBuf::from("clisync");
        ctx.temp_base = base.to_path_buf();
        ctx
    }

    fn dump_dir(base: &std::path::Path) -> String {
        base.join(format!(".clisync-{}", std::process::id()))
            .join("mysql")
            .display()
            .to_string()
    }

    #[test]
    fn test_database_pairs_dump_foreign_restore_local() {
        let base = tempfile::tempdir().unwrap();
        let runner = Recorder::default();
        let ctx = context(
            "sync:\n  rsync:\n    path: /mnt/live\n  mysql:\n    username: u\n    password: p\n    host: h\n    database: [foo, 'bar:baz']\n",
            &runner,
            base.path(),
        );

        run::<Backup>(&ctx).unwrap();

        let dir = dump_dir(base.path());
        assert_eq!(
            runner.lines(),
            vec![
                "rsync -rlptD --delete-after --progress -h /mnt/live/ /work/".to_string(),
                format!("mysqldump -uu -pp -hh foo | bzip2 --compress --stdout > {dir}/foo.sql.bz2"),
                format!("clisync mysql:restore foo {dir}/foo.sql.bz2"),
                format!("mysqldump -uu -pp -hh baz | bzip2 --compress --stdout > {dir}/bar.sql.bz2"),
                format!("clisync mysql:restore bar {dir}/bar.sql.bz2"),
            ]
        );
        assert!(!PathBuf::from(dir).exists());
    }

    #[test]
    fn test_remote_filtered_dump() {
        let base = tempfile::tempdir().unwrap();
        let runner = Recorder {
            captured: "pages\nlogs\n".into(),
            ..Recorder::default()
        };
        let ctx = context(
            "sync:\n  ssh:\n    hostname: live\n    path: /srv\n  mysql:\n    filter: nolog\n    database: [shop]\n    mysqldump:\n      option: --single-transaction\nmysql-backup-filter:\n  nolog: ['!logs']\n",
            &runner,
            base.path(),
        );

        run::<Backup>(&ctx).unwrap();

        let lines = runner.lines.borrow();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            (
                "ssh -o BatchMode=yes live 'mysql shop --skip-column-names -e '\\''show tables;'\\'''"
                    .to_string(),
                Mode::Captured
            )
        );
        let dir = dump_dir(base.path());
        assert_eq!(
            lines[1].0,
            format!(
                "ssh -o BatchMode=yes live 'set -o pipefail; ( mysqldump --single-transaction shop --no-data | bzip2 --compress --stdout && mysqldump --single-transaction shop --no-create-info pages | bzip2 --compress --stdout )' > {dir}/shop.sql.bz2"
            )
        );
        assert_eq!(lines[1].1, Mode::Interactive);
        assert_eq!(lines[2].0, format!("clisync mysql:restore shop {dir}/shop.sql.bz2"));
    }

    #[test]
    fn test_nothing_configured_runs_nothing() {
        let base = tempfile::tempdir().unwrap();
        let runner = Recorder::default();
        let ctx = context(
            "sync:\n  ssh:\n    hostname: live\n    path: /srv\n",
            &runner,
            base.path(),
        );
        run::<Backup>(&ctx).unwrap();
        assert!(runner.lines().is_empty());
    }

    #[test]
    fn test_unknown_filter_aborts_before_any_process() {
        let base = tempfile::tempdir().unwrap();
        let runner = Recorder::default();
        let ctx = context(
            "sync:\n  rsync:\n    path: /mnt/live\n  mysql:\n    filter: missing\n    database: [shop]\n",
            &runner,
            base.path(),
        );
        let err = run::<Backup>(&ctx).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Config(crate::config_file::ConfigError::UnknownFilter(_))
        ));
        assert!(runner.lines().is_empty());
    }

    #[test]
    fn test_failure_stops_remaining_steps_and_cleans_up() {
        let base = tempfile::tempdir().unwrap();
        let runner = Recorder {
            fail_on: Some("mysqldump".into()),
            ..Recorder::default()
        };
        let ctx = context(
            "sync:\n  rsync:\n    path: /mnt/live\n  mysql:\n    database: [a, b]\n",
            &runner,
            base.path(),
        );
        let err = run::<Backup>(&ctx).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert_eq!(runner.lines().len(), 2);
        assert!(!PathBuf::from(dump_dir(base.path())).exists());
    }

    #[test]
    fn test_invalid_config_runs_nothing() {
        let base = tempfile::tempdir().unwrap();
        let runner = Recorder::default();
        let ctx = context("sync:\n  mysql:\n    database: [a]\n", &runner, base.path());
        let err = run::<Backup>(&ctx).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(runner.lines().is_empty());
        assert!(!PathBuf::from(dump_dir(base.path())).exists());
    }

    #[test]
    fn test_invalid_later_database_aborts_before_any_process() {
        let base = tempfile::tempdir().unwrap();
        let runner = Recorder::default();
        let ctx = context(
            "sync:\n  rsync:\n    path: /mnt/live\n  mysql:\n    database: [foo, 'bad.name']\n",
            &runner,
            base.path(),
        );
        let err = run::<Backup>(&ctx).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Config(crate::config_file::ConfigError::Validation(_))
        ));
        assert!(runner.lines().is_empty());
        assert!(!PathBuf::from(dump_dir(base.path())).exists());
    }
}
