//! MySQL client commands
//!
//! Shared pieces of the dump pipelines used by the sync workflows, plus the
//! local `mysql:backup` and `mysql:restore` tasks they re-invoke.

use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::config_file::{ConfigError, ConfigMysql, is_valid_database_name};
use crate::filter::{TableFilter, parse_table_list};
use crate::shell::{
    CombinedOutputBuilder, Command, CommandBuilder, ExecError, Executor, ProcessRunner,
};

#[derive(Error, Debug)]
pub enum MysqlError {
    #[error("Invalid database name `{0}`")]
    InvalidDatabase(String),
    #[error("Dump file not found: {0}")]
    DumpNotFound(PathBuf),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl MysqlError {
    /// Process exit code to report for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            MysqlError::Exec(e) => e.exit_code().unwrap_or(1),
            _ => 1,
        }
    }
}

/// Connection options shared by `mysql` and `mysqldump`
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
}

impl Credentials {
    #[must_use]
    pub fn from_config(mysql: &ConfigMysql) -> Self {
        Self {
            username: mysql.username.clone(),
            password: mysql.password.clone(),
            host: mysql.host.clone(),
        }
    }

    /// `program` with `-u`, `-p` and `-h` for every value that is set.
    #[must_use]
    pub fn client(&self, program: &str) -> CommandBuilder {
        let mut command = CommandBuilder::new(program);
        if let Some(ref username) = self.username {
            command.add_argument_template("-u%s", &[username.as_str()]);
        }
        if let Some(ref password) = self.password {
            command.add_argument_template("-p%s", &[password.as_str()]);
        }
        if let Some(ref host) = self.host {
            command.add_argument_template("-h%s", &[host.as_str()]);
        }
        command
    }
}

/// Dump file compression, picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Bzip2,
    Gzip,
    Xz,
    Plain,
}

impl Compression {
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("bz2") => Compression::Bzip2,
            Some("gz") => Compression::Gzip,
            Some("xz") => Compression::Xz,
            _ => Compression::Plain,
        }
    }

    /// Filter compressing stdin to stdout, if any.
    #[must_use]
    pub fn compressor(self) -> Option<CommandBuilder> {
        let (program, args) = match self {
            Compression::Bzip2 => ("bzip2", "--compress --stdout"),
            Compression::Gzip => ("gzip", "--stdout"),
            Compression::Xz => ("xz", "--compress --stdout"),
            Compression::Plain => return None,
        };
        Some(CommandBuilder::new(program).with_argument_raw(args))
    }

    /// Command writing the decompressed contents of `file` to stdout.
    #[must_use]
    pub fn reader(self, file: &Path) -> CommandBuilder {
        let command = match self {
            Compression::Bzip2 => CommandBuilder::new("bzip2").with_argument_raw("-dc"),
            Compression::Gzip => CommandBuilder::new("gzip").with_argument_raw("-dc"),
            Compression::Xz => CommandBuilder::new("xz").with_argument_raw("-dc"),
            Compression::Plain => CommandBuilder::new("cat"),
        };
        command.with_argument(file.to_string_lossy())
    }
}

/// Check that `name` can be used unquoted in SQL and as a file name.
///
/// # Errors
///
/// Returns `MysqlError::InvalidDatabase` for an empty name or one with
/// characters outside `[A-Za-z0-9_$-]`.
pub fn validate_database_name(name: &str) -> Result<(), MysqlError> {
    if is_valid_database_name(name) {
        Ok(())
    } else {
        Err(MysqlError::InvalidDatabase(name.to_string()))
    }
}

/// `mysql <database> --skip-column-names -e 'show tables;'` derived from a
/// client template.
#[must_use]
pub fn table_list_command(client: &CommandBuilder, database: &str) -> CommandBuilder {
    let mut command = client.clone();
    command
        .set_program("mysql")
        .clear_output_redirect()
        .clear_pipes()
        .add_argument(database)
        .add_argument("--skip-column-names")
        .add_argument("-e")
        .add_argument("show tables;");
    command
}

/// Structure of every table followed by the data of `tables`.
///
/// `dump` is a complete `mysqldump` invocation for one database, including its
/// compression pipe. Without tables only the structure pass is emitted.
#[must_use]
pub fn filtered_dump(dump: &CommandBuilder, tables: &[String]) -> Command {
    let mut combined = CombinedOutputBuilder::new();
    combined.add_command_for_combined_output(dump.clone().with_argument("--no-data"));
    if tables.is_empty() {
        warn!("Filter leaves no tables, dumping structure only");
    } else {
        combined.add_command_for_combined_output(
            dump.clone()
                .with_argument("--no-create-info")
                .with_argument_list(tables.iter().cloned()),
        );
    }
    combined.build()
}

/// Query the live table list with `table_query` and build the filtered dump.
///
/// # Errors
///
/// Returns `ExecError` if the table list query fails.
pub fn apply_filter(
    dump: &CommandBuilder,
    table_query: Command,
    filter: &TableFilter,
    runner: &dyn ProcessRunner,
) -> Result<Command, ExecError> {
    info!("Using filter \"{}\"", filter.name);
    let output = Executor::new(table_query).execute(runner)?;
    let tables = filter.apply(parse_table_list(&output));
    Ok(filtered_dump(dump, &tables))
}

/// Dump the local `database` into `file`, compressed by its extension.
///
/// # Errors
///
/// Returns `MysqlError` if the name is invalid or any command fails.
pub fn backup(
    database: &str,
    file: &Path,
    filter: Option<&TableFilter>,
    credentials: &Credentials,
    runner: &dyn ProcessRunner,
) -> Result<(), MysqlError> {
    validate_database_name(database)?;
    info!("Backing up database {database} to {}", file.display());

    let mut dump = credentials.client("mysqldump").with_argument(database);
    if let Some(compressor) = Compression::from_path(file).compressor() {
        dump.add_pipe_command(compressor);
    }

    let command = match filter {
        Some(filter) => {
            let query = table_list_command(&credentials.client("mysql"), database);
            apply_filter(&dump, query.into(), filter, runner)?
        }
        None => dump.into(),
    };

    Executor::new(command.redirect_to(file)).execute_interactive(runner)?;
    Ok(())
}

/// Recreate the local `database` and import `file` into it.
///
/// # Errors
///
/// Returns `MysqlError` if the name is invalid, the file is missing or any
/// command fails.
pub fn restore(
    database: &str,
    file: &Path,
    credentials: &Credentials,
    runner: &dyn ProcessRunner,
) -> Result<(), MysqlError> {
    validate_database_name(database)?;
    if !file.is_file() {
        return Err(MysqlError::DumpNotFound(file.to_path_buf()));
    }
    info!("Restoring database {database} from {}", file.display());

    let recreate = credentials
        .client("mysql")
        .with_argument("-e")
        .with_argument(format!(
            "DROP DATABASE IF EXISTS `{database}`; CREATE DATABASE `{database}`"
        ));
    Executor::new(recreate).execute_interactive(runner)?;

    let import = Compression::from_path(file)
        .reader(file)
        .with_pipe(credentials.client("mysql").with_argument(database));
    Executor::new(import).execute_interactive(runner)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io;

    use super::*;
    use crate::shell::{Mode, ProcessOutput};

    struct Recorder {
        lines: RefCell<Vec<String>>,
        tables: &'static str,
    }

    impl Recorder {
        fn new(tables: &'static str) -> Self {
            Self {
                lines: RefCell::new(Vec::new()),
                tables,
            }
        }
    }

    impl ProcessRunner for Recorder {
        fn run(&self, command_line: &str, mode: Mode) -> io::Result<ProcessOutput> {
            self.lines.borrow_mut().push(command_line.to_string());
            Ok(ProcessOutput {
                success: true,
                exit_code: Some(0),
                stdout: if mode == Mode::Captured {
                    self.tables.to_string()
                } else {
                    String::new()
                },
            })
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            username: Some("dev".into()),
            password: Some("dev".into()),
            host: Some("localhost".into()),
        }
    }

    #[test]
    fn test_client_skips_unset_credentials() {
        assert_eq!(Credentials::default().client("mysql").render(), "mysql");
        assert_eq!(
            credentials().client("mysqldump").render(),
            "mysqldump -udev -pdev -hlocalhost"
        );
    }

    #[test]
    fn test_compression_from_path() {
        assert_eq!(Compression::from_path(Path::new("a.sql.bz2")), Compression::Bzip2);
        assert_eq!(Compression::from_path(Path::new("a.sql.gz")), Compression::Gzip);
        assert_eq!(Compression::from_path(Path::new("a.sql.xz")), Compression::Xz);
        assert_eq!(Compression::from_path(Path::new("a.sql")), Compression::Plain);
        assert!(Compression::Plain.compressor().is_none());
        assert_eq!(
            Compression::Gzip.reader(Path::new("/tmp/a.sql.gz")).render(),
            "gzip -dc /tmp/a.sql.gz"
        );
    }

    #[test]
    fn test_validate_database_name() {
        assert!(validate_database_name("shop_2-live").is_ok());
        assert!(validate_database_name("").is_err());
        assert!(validate_database_name("shop; DROP").is_err());
        assert!(validate_database_name("a`b").is_err());
    }

    #[test]
    fn test_table_list_command_drops_pipes() {
        let template = credentials()
            .client("mysqldump")
            .with_pipe(CommandBuilder::new("bzip2"))
            .with_output_redirect("/tmp/x");
        insta::assert_snapshot!(
            table_list_command(&template, "shop").render(),
            @"mysql -udev -pdev -hlocalhost shop --skip-column-names -e 'show tables;'"
        );
    }

    #[test]
    fn test_filtered_dump_splits_structure_and_data() {
        let runner = Recorder::new("pages\nlogs\ntt_content\n");
        let dump = CommandBuilder::new("mysqldump").with_argument("shop");
        let filter = TableFilter::new("nolog", &["!logs"]).unwrap();
        let query = table_list_command(&CommandBuilder::new("mysql"), "shop");

        let command = apply_filter(&dump, query.into(), &filter, &runner).unwrap();

        match command {
            Command::Combined(ref children) => {
                assert_eq!(children.len(), 2);
                assert_eq!(children[0].render(), "mysqldump shop --no-data");
                assert_eq!(
                    children[1].render(),
                    "mysqldump shop --no-create-info pages tt_content"
                );
            }
            ref other => panic!("Expected Combined, got: {other:?}"),
        }
    }

    #[test]
    fn test_filtered_dump_without_tables() {
        let dump = CommandBuilder::new("mysqldump").with_argument("shop");
        let command = filtered_dump(&dump, &[]);
        assert_eq!(command.render(), "mysqldump shop --no-data");
    }

    #[test]
    fn test_backup_with_filter() {
        let runner = Recorder::new("pages\ncache_hash\n");
        let filter = TableFilter::resolve("typo3", &std::collections::BTreeMap::new()).unwrap();
        backup(
            "shop",
            Path::new("/tmp/shop.sql.bz2"),
            Some(&filter),
            &credentials(),
            &runner,
        )
        .unwrap();

        let lines = runner.lines.borrow();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "mysql -udev -pdev -hlocalhost shop --skip-column-names -e 'show tables;'"
        );
        insta::assert_snapshot!(
            lines[1],
            @"( mysqldump -udev -pdev -hlocalhost shop --no-data | bzip2 --compress --stdout && mysqldump -udev -pdev -hlocalhost shop --no-create-info pages | bzip2 --compress --stdout ) > /tmp/shop.sql.bz2"
        );
    }

    #[test]
    fn test_backup_plain() {
        let runner = Recorder::new("");
        backup("shop", Path::new("/tmp/shop.sql"), None, &Credentials::default(), &runner)
            .unwrap();
        assert_eq!(
            runner.lines.borrow().as_slice(),
            ["mysqldump shop > /tmp/shop.sql"]
        );
    }

    #[test]
    fn test_restore_recreates_and_imports() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("shop.sql.bz2");
        std::fs::write(&file, b"BZh").unwrap();
        let runner = Recorder::new("");

        restore("shop", &file, &Credentials::default(), &runner).unwrap();

        let lines = runner.lines.borrow();
        assert_eq!(
            lines[0],
            "mysql -e 'DROP DATABASE IF EXISTS `shop`; CREATE DATABASE `shop`'"
        );
        assert_eq!(
            lines[1],
            format!("bzip2 -dc {} | mysql shop", crate::shell::quote(&file.to_string_lossy()))
        );
    }

    #[test]
    fn test_restore_missing_file() {
        let runner = Recorder::new("");
        let err = restore("shop", Path::new("/nonexistent/shop.sql"), &Credentials::default(), &runner)
            .unwrap_err();
        assert!(matches!(err, MysqlError::DumpNotFound(_)));
        assert_eq!(err.exit_code(), 1);
        assert!(runner.lines.borrow().is_empty());
    }
}
