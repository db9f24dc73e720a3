use std::path::PathBuf;
use std::process::ExitCode;

use log::{error, info};

use clisync::config_file::ConfigError;
use clisync::load_config;
use clisync::shell::ShellRunner;
use clisync::sync::{SyncContext, SyncError, Workflow};

use crate::failure_code;

/// Run a sync workflow against the project config.
pub fn run<W: Workflow>(config_file: Option<&str>, log_file: Option<&str>) -> ExitCode {
    let (config, working_path, config_path) = match load_config(config_file) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Found {} directory: {}",
        config_path.file_name().unwrap_or_default().to_string_lossy(),
        working_path.display()
    );

    let runner = ShellRunner;
    let result = SyncContext::new(&config, W::AREA, working_path, &runner)
        .map_err(SyncError::from)
        .and_then(|mut ctx| {
            // Self invocations must see the same project and log file
            ctx.config_file = Some(config_path);
            ctx.log_file = log_file.map(PathBuf::from);
            clisync::sync::run::<W>(&ctx)
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(SyncError::Config(ConfigError::Validation(errors))) => {
            for reason in errors {
                error!("{reason}");
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e}");
            failure_code(e.exit_code())
        }
    }
}
