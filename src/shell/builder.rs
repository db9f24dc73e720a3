use std::fmt;
use std::path::{Path, PathBuf};

use crate::shell::{format_template, quote};

/// A single token of a command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// Quoted when rendered
    Escaped(String),
    /// Rendered verbatim, the caller vouches for its safety
    Raw(String),
}

impl Argument {
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Argument::Escaped(value) => quote(value),
            Argument::Raw(value) => value.clone(),
        }
    }
}

/// One external program invocation with its arguments, pipe chain and
/// optional output redirect.
///
/// Builders are plain values: cloning one yields an independent copy, so a
/// partially configured builder (credentials applied, say) can be reused as a
/// template for several invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBuilder {
    program: String,
    arguments: Vec<Argument>,
    pipes: Vec<CommandBuilder>,
    redirect: Option<PathBuf>,
}

impl CommandBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            arguments: Vec::new(),
            pipes: Vec::new(),
            redirect: None,
        }
    }

    /// Builder re-invoking `executable` (the running binary) with `subcommand`.
    pub fn for_self(executable: &Path, subcommand: &str) -> Self {
        let mut builder = Self::new(executable.to_string_lossy());
        builder.add_argument(subcommand);
        builder
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    #[must_use]
    pub fn pipes(&self) -> &[CommandBuilder] {
        &self.pipes
    }

    #[must_use]
    pub fn output_redirect(&self) -> Option<&Path> {
        self.redirect.as_deref()
    }

    pub fn set_program(&mut self, program: impl Into<String>) -> &mut Self {
        self.program = program.into();
        self
    }

    pub fn add_argument(&mut self, value: impl Into<String>) -> &mut Self {
        self.arguments.push(Argument::Escaped(value.into()));
        self
    }

    pub fn add_argument_template(&mut self, template: &str, values: &[&str]) -> &mut Self {
        self.arguments
            .push(Argument::Escaped(format_template(template, values)));
        self
    }

    pub fn add_argument_raw(&mut self, value: impl Into<String>) -> &mut Self {
        self.arguments.push(Argument::Raw(value.into()));
        self
    }

    pub fn add_argument_list<I, S>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments
            .extend(values.into_iter().map(|v| Argument::Escaped(v.into())));
        self
    }

    /// Append `--`, ending option parsing for most programs.
    pub fn add_argument_separator(&mut self) -> &mut Self {
        self.add_argument_raw("--")
    }

    pub fn set_output_redirect_to_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.redirect = Some(path.into());
        self
    }

    pub fn clear_output_redirect(&mut self) -> &mut Self {
        self.redirect = None;
        self
    }

    pub fn add_pipe_command(&mut self, next: CommandBuilder) -> &mut Self {
        self.pipes.push(next);
        self
    }

    pub fn clear_pipes(&mut self) -> &mut Self {
        self.pipes.clear();
        self
    }

    #[must_use]
    pub fn with_argument(mut self, value: impl Into<String>) -> Self {
        self.add_argument(value);
        self
    }

    #[must_use]
    pub fn with_argument_template(mut self, template: &str, values: &[&str]) -> Self {
        self.add_argument_template(template, values);
        self
    }

    #[must_use]
    pub fn with_argument_raw(mut self, value: impl Into<String>) -> Self {
        self.add_argument_raw(value);
        self
    }

    #[must_use]
    pub fn with_argument_list<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_argument_list(values);
        self
    }

    #[must_use]
    pub fn with_pipe(mut self, next: CommandBuilder) -> Self {
        self.add_pipe_command(next);
        self
    }

    #[must_use]
    pub fn with_output_redirect(mut self, path: impl Into<PathBuf>) -> Self {
        self.set_output_redirect_to_file(path);
        self
    }

    /// Render as `program args | next args ... > file`.
    #[must_use]
    pub fn render(&self) -> String {
        let mut line = quote(&self.program);
        for argument in &self.arguments {
            line.push(' ');
            line.push_str(&argument.render());
        }
        for pipe in &self.pipes {
            line.push_str(" | ");
            line.push_str(&pipe.render());
        }
        if let Some(ref target) = self.redirect {
            line.push_str(" > ");
            line.push_str(&quote(&target.to_string_lossy()));
        }
        line
    }
}

impl fmt::Display for CommandBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
