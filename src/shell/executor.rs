use std::io;
use std::process::{Command as ProcessCommand, Stdio};

use log::debug;
use thiserror::Error;

use crate::shell::command::Command;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("unable to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("command execution failed (exit code {}): {command}", display_code(.code))]
    Failed { command: String, code: Option<i32> },
}

#[allow(clippy::ref_option)]
fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

impl ExecError {
    /// Exit code of the failed process, if it exited normally.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::Failed { code, .. } => *code,
            ExecError::Spawn { .. } => None,
        }
    }
}

/// How a command line is attached to the invoking process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Standard streams inherited, nothing captured
    Interactive,
    /// Standard output captured, stdin and stderr inherited
    Captured,
}

/// Result of running one command line.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
}

/// Runs rendered command lines.
pub trait ProcessRunner {
    /// Run `command_line` to completion.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the process cannot be spawned or waited on.
    fn run(&self, command_line: &str, mode: Mode) -> io::Result<ProcessOutput>;
}

/// Runs command lines through `bash -o pipefail -c`, so a failing stage
/// anywhere in a pipe chain fails the whole line.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl ProcessRunner for ShellRunner {
    fn run(&self, command_line: &str, mode: Mode) -> io::Result<ProcessOutput> {
        let mut process = ProcessCommand::new("bash");
        process.args(["-o", "pipefail", "-c"]).arg(command_line);
        match mode {
            Mode::Interactive => {
                let status = process.status()?;
                Ok(ProcessOutput {
                    success: status.success(),
                    exit_code: status.code(),
                    stdout: String::new(),
                })
            }
            Mode::Captured => {
                let output = process
                    .stdin(Stdio::inherit())
                    .stderr(Stdio::inherit())
                    .output()?;
                Ok(ProcessOutput {
                    success: output.status.success(),
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                })
            }
        }
    }
}

type Finisher<'a> = Box<dyn FnOnce() + 'a>;

/// Executes one [`Command`] and runs its finisher callbacks afterwards.
///
/// Executing consumes the executor, so finishers run exactly once, whether the
/// process succeeded, failed or could not be started.
pub struct Executor<'a> {
    command: Command,
    finishers: Vec<Finisher<'a>>,
}

impl<'a> Executor<'a> {
    pub fn new(command: impl Into<Command>) -> Self {
        Self {
            command: command.into(),
            finishers: Vec::new(),
        }
    }

    #[must_use]
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn add_finisher_callback(&mut self, finisher: impl FnOnce() + 'a) -> &mut Self {
        self.finishers.push(Box::new(finisher));
        self
    }

    /// Run with the caller's terminal attached.
    ///
    /// # Errors
    ///
    /// Returns `ExecError::Failed` on a non-zero exit, `ExecError::Spawn` if the
    /// shell cannot be started.
    pub fn execute_interactive(self, runner: &dyn ProcessRunner) -> Result<(), ExecError> {
        let line = self.command.render();
        let result = run_line(runner, &line, Mode::Interactive).map(|_| ());
        self.finish();
        result
    }

    /// Run with standard output captured and return it trimmed.
    ///
    /// Combined commands run each child separately and join the outputs in
    /// order.
    ///
    /// # Errors
    ///
    /// Returns `ExecError::Failed` on a non-zero exit of any part, discarding
    /// output captured so far.
    pub fn execute(self, runner: &dyn ProcessRunner) -> Result<String, ExecError> {
        let result = capture(runner, &self.command).map(|out| out.trim().to_string());
        self.finish();
        result
    }

    fn finish(self) {
        for finisher in self.finishers {
            finisher();
        }
    }
}

fn capture(runner: &dyn ProcessRunner, command: &Command) -> Result<String, ExecError> {
    match command {
        Command::Combined(children) => {
            let mut combined = String::new();
            for child in children {
                combined.push_str(&capture(runner, child)?);
            }
            Ok(combined)
        }
        other => run_line(runner, &other.render(), Mode::Captured),
    }
}

fn run_line(runner: &dyn ProcessRunner, line: &str, mode: Mode) -> Result<String, ExecError> {
    debug!("Executing ({mode:?}): {line}");
    let output = runner.run(line, mode).map_err(|source| ExecError::Spawn {
        command: line.to_string(),
        source,
    })?;
    if output.success {
        Ok(output.stdout)
    } else {
        Err(ExecError::Failed {
            command: line.to_string(),
            code: output.exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::shell::{CombinedOutputBuilder, CommandBuilder};

    /// Answers by program name, recording every line.
    struct ScriptedRunner {
        lines: RefCell<Vec<(String, Mode)>>,
    }

    impl ScriptedRunner {
        fn new() -> Self {
            Self {
                lines: RefCell::new(Vec::new()),
            }
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn run(&self, command_line: &str, mode: Mode) -> io::Result<ProcessOutput> {
            self.lines.borrow_mut().push((command_line.to_string(), mode));
            let (program, rest) = command_line.split_once(' ').unwrap_or((command_line, ""));
            match program {
                "echo" => Ok(ProcessOutput {
                    success: true,
                    exit_code: Some(0),
                    stdout: format!("{rest}\n"),
                }),
                "missing" => Err(io::Error::new(io::ErrorKind::NotFound, "not found")),
                _ => Ok(ProcessOutput {
                    success: false,
                    exit_code: Some(3),
                    stdout: "partial".to_string(),
                }),
            }
        }
    }

    #[test]
    fn test_execute_returns_trimmed_output() {
        let runner = ScriptedRunner::new();
        let out = Executor::new(CommandBuilder::new("echo").with_argument("hello"))
            .execute(&runner)
            .unwrap();
        assert_eq!(out, "hello");
        assert_eq!(runner.lines.borrow()[0].1, Mode::Captured);
    }

    #[test]
    fn test_combined_output_preserves_order() {
        let runner = ScriptedRunner::new();
        let mut combined = CombinedOutputBuilder::new();
        combined
            .add_command_for_combined_output(CommandBuilder::new("echo").with_argument("A"))
            .add_command_for_combined_output(CommandBuilder::new("echo").with_argument("B"));
        let out = Executor::new(combined).execute(&runner).unwrap();
        assert_eq!(out, "A\nB");
        let lines = runner.lines.borrow();
        assert_eq!(lines[0].0, "echo A");
        assert_eq!(lines[1].0, "echo B");
    }

    #[test]
    fn test_combined_failure_discards_output() {
        let runner = ScriptedRunner::new();
        let mut combined = CombinedOutputBuilder::new();
        combined
            .add_command_for_combined_output(CommandBuilder::new("echo").with_argument("A"))
            .add_command_for_combined_output(CommandBuilder::new("false"))
            .add_command_for_combined_output(CommandBuilder::new("echo").with_argument("C"));
        let err = Executor::new(combined).execute(&runner).unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
        assert_eq!(runner.lines.borrow().len(), 2);
    }

    #[test]
    fn test_interactive_failure_reports_exit_code() {
        let runner = ScriptedRunner::new();
        let err = Executor::new(CommandBuilder::new("rsync"))
            .execute_interactive(&runner)
            .unwrap_err();
        match err {
            ExecError::Failed { command, code } => {
                assert_eq!(command, "rsync");
                assert_eq!(code, Some(3));
            }
            other @ ExecError::Spawn { .. } => panic!("Expected Failed, got: {other:?}"),
        }
        assert_eq!(runner.lines.borrow()[0].1, Mode::Interactive);
    }

    #[test]
    fn test_finishers_run_once_on_success_and_failure() {
        let runner = ScriptedRunner::new();
        let calls = Cell::new(0);

        let mut ok = Executor::new(CommandBuilder::new("echo"));
        ok.add_finisher_callback(|| calls.set(calls.get() + 1));
        ok.execute_interactive(&runner).unwrap();
        assert_eq!(calls.get(), 1);

        let mut failing = Executor::new(CommandBuilder::new("false"));
        failing
            .add_finisher_callback(|| calls.set(calls.get() + 1))
            .add_finisher_callback(|| calls.set(calls.get() + 10));
        assert!(failing.execute(&runner).is_err());
        assert_eq!(calls.get(), 12);
    }

    #[test]
    fn test_finishers_run_when_spawn_fails() {
        let runner = ScriptedRunner::new();
        let calls = Cell::new(0);
        let mut exec = Executor::new(CommandBuilder::new("missing"));
        exec.add_finisher_callback(|| calls.set(calls.get() + 1));
        let err = exec.execute_interactive(&runner).unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
        assert_eq!(err.exit_code(), None);
        assert_eq!(calls.get(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_runner_captures_stdout() {
        let out = Executor::new(
            CommandBuilder::new("printf").with_argument("%s\\n").with_argument("it's"),
        )
        .execute(&ShellRunner)
        .unwrap();
        assert_eq!(out, "it's");
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_runner_reports_exit_status() {
        let err = Executor::new(CommandBuilder::new("sh").with_argument("-c").with_argument("exit 7"))
            .execute_interactive(&ShellRunner)
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(7));
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_runner_fails_on_failing_pipe_head() {
        let err = Executor::new(CommandBuilder::new("false").with_pipe(CommandBuilder::new("cat")))
            .execute_interactive(&ShellRunner)
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_runner_pipe_chain_succeeds() {
        let out = Executor::new(
            CommandBuilder::new("printf")
                .with_argument("shop")
                .with_pipe(CommandBuilder::new("cat")),
        )
        .execute(&ShellRunner)
        .unwrap();
        assert_eq!(out, "shop");
    }
}
