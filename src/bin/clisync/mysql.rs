use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use log::{debug, error};

use clisync::filter::TableFilter;
use clisync::load_config;
use clisync::mysql::{self, Credentials, MysqlError};
use clisync::shell::ShellRunner;

use crate::failure_code;

/// Connection overrides; without them the client's option files apply
#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// MySQL user
    #[arg(long)]
    user: Option<String>,

    /// MySQL password
    #[arg(long)]
    password: Option<String>,

    /// MySQL host
    #[arg(long)]
    host: Option<String>,
}

impl From<&ConnectionArgs> for Credentials {
    fn from(args: &ConnectionArgs) -> Self {
        Credentials {
            username: args.user.clone(),
            password: args.password.clone(),
            host: args.host.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Database to dump
    database: String,

    /// Dump file; `.bz2`, `.gz` and `.xz` select compression
    file: PathBuf,

    /// Dump the data of tables kept by this filter only
    #[arg(long)]
    filter: Option<String>,

    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Database to recreate
    database: String,

    /// Dump file to import
    file: PathBuf,

    #[command(flatten)]
    connection: ConnectionArgs,
}

/// Filters from the project config, if there is one.
fn project_filters(config_file: Option<&str>) -> BTreeMap<String, Vec<String>> {
    match load_config(config_file) {
        Ok((config, _, _)) => config.filters,
        Err(e) => {
            debug!("No project filters available: {e}");
            BTreeMap::new()
        }
    }
}

fn report(result: Result<(), MysqlError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            failure_code(e.exit_code())
        }
    }
}

pub fn backup(args: &BackupArgs, config_file: Option<&str>) -> ExitCode {
    let filter = match args.filter {
        Some(ref name) => match TableFilter::resolve(name, &project_filters(config_file)) {
            Ok(filter) => Some(filter),
            Err(e) => return report(Err(e.into())),
        },
        None => None,
    };
    report(mysql::backup(
        &args.database,
        &args.file,
        filter.as_ref(),
        &Credentials::from(&args.connection),
        &ShellRunner,
    ))
}

pub fn restore(args: &RestoreArgs) -> ExitCode {
    report(mysql::restore(
        &args.database,
        &args.file,
        &Credentials::from(&args.connection),
        &ShellRunner,
    ))
}
