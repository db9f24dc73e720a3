use std::fmt;
use std::path::PathBuf;

use crate::shell::builder::CommandBuilder;
use crate::shell::quote;

/// A composed command, interpreted by the [`Executor`](crate::shell::Executor)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A single invocation with its own pipe chain
    Leaf(CommandBuilder),
    /// Children run one after another, their outputs concatenated in order
    Combined(Vec<Command>),
    /// `inner` rendered and passed as one argument to `transport` (ssh)
    Remote {
        transport: CommandBuilder,
        inner: Box<Command>,
    },
    /// Standard output of `inner` written to `target`
    Redirect { inner: Box<Command>, target: PathBuf },
}

impl Command {
    /// Wrap in `ssh -o BatchMode=yes <destination>` when a destination is
    /// given, otherwise return the command unchanged.
    #[must_use]
    pub fn wrap_remote(self, destination: Option<&str>) -> Command {
        match destination {
            Some(destination) => {
                let transport = CommandBuilder::new("ssh")
                    .with_argument_raw("-o BatchMode=yes")
                    .with_argument(destination);
                Command::Remote {
                    transport,
                    inner: Box::new(self),
                }
            }
            None => self,
        }
    }

    /// Send standard output to `target` on the local side.
    #[must_use]
    pub fn redirect_to(self, target: impl Into<PathBuf>) -> Command {
        match self {
            Command::Leaf(builder) => Command::Leaf(builder.with_output_redirect(target)),
            other => Command::Redirect {
                inner: Box::new(other),
                target: target.into(),
            },
        }
    }

    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Command::Leaf(builder) => builder.render(),
            Command::Combined(children) => match children.as_slice() {
                [] => "true".to_string(),
                [single] => single.render(),
                children => {
                    let parts: Vec<String> = children.iter().map(Command::render).collect();
                    format!("( {} )", parts.join(" && "))
                }
            },
            Command::Remote { transport, inner } => {
                let remote = if inner.has_pipes() {
                    format!("set -o pipefail; {}", inner.render())
                } else {
                    inner.render()
                };
                format!("{} {}", transport.render(), quote(&remote))
            }
            Command::Redirect { inner, target } => {
                format!("{} > {}", inner.render(), quote(&target.to_string_lossy()))
            }
        }
    }
}

impl Command {
    /// Whether any leaf pipes into another command.
    fn has_pipes(&self) -> bool {
        match self {
            Command::Leaf(builder) => !builder.pipes().is_empty(),
            Command::Combined(children) => children.iter().any(Command::has_pipes),
            Command::Remote { inner, .. } | Command::Redirect { inner, .. } => inner.has_pipes(),
        }
    }
}

impl From<CommandBuilder> for Command {
    fn from(builder: CommandBuilder) -> Self {
        Command::Leaf(builder)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Collects independent commands whose outputs form one stream
#[derive(Debug, Clone, Default)]
pub struct CombinedOutputBuilder {
    children: Vec<Command>,
}

impl CombinedOutputBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_command_for_combined_output(&mut self, command: impl Into<Command>) -> &mut Self {
        self.children.push(command.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Command {
        Command::Combined(self.children)
    }
}

impl From<CombinedOutputBuilder> for Command {
    fn from(builder: CombinedOutputBuilder) -> Self {
        builder.build()
    }
}
