mod mysql;
mod sync;

use std::fs::OpenOptions;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use clisync::sync::{Backup, Restore, Share};

#[derive(Parser, Debug)]
#[command(
    name = "clisync",
    version,
    about = "Sync project files and MySQL databases to a local working copy"
)]
struct Cli {
    /// Path to config file (auto-detected if not specified)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log file path (appended to, in addition to the console)
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync files and databases from the live server
    #[command(name = "sync:sync")]
    Sync,
    /// Restore files and databases from the shared dump location
    #[command(name = "sync:restore")]
    Restore,
    /// Publish local files and databases to the shared dump location
    #[command(name = "sync:share")]
    Share,
    /// Dump a local database into a file
    #[command(name = "mysql:backup")]
    MysqlBackup(mysql::BackupArgs),
    /// Recreate a local database from a dump file
    #[command(name = "mysql:restore")]
    MysqlRestore(mysql::RestoreArgs),
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Appending, since self invocations write to the same log file
    let log_file = cli
        .log_file
        .as_ref()
        .map(|path| OpenOptions::new().create(true).append(true).open(path))
        .transpose()?;
    clisync::logger::init(log_file)?;

    let config = cli.config.as_deref();
    let log_file = cli.log_file.as_deref();
    match cli.command {
        Commands::Sync => Ok(sync::run::<Backup>(config, log_file)),
        Commands::Restore => Ok(sync::run::<Restore>(config, log_file)),
        Commands::Share => Ok(sync::run::<Share>(config, log_file)),
        Commands::MysqlBackup(ref args) => Ok(mysql::backup(args, config)),
        Commands::MysqlRestore(ref args) => Ok(mysql::restore(args)),
    }
}

/// Exit code for a failed run: the failed process's status, or 1.
fn failure_code(code: i32) -> ExitCode {
    u8::try_from(code)
        .ok()
        .filter(|c| *c != 0)
        .map_or(ExitCode::FAILURE, ExitCode::from)
}
