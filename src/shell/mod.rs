//! Shell command construction and execution
//!
//! Commands are assembled as plain values ([`CommandBuilder`] for a single
//! invocation with its pipe chain, [`Command`] for composed graphs) and rendered
//! to a `bash -o pipefail -c` command line by the [`Executor`].

pub mod builder;
pub mod command;
pub mod executor;

pub use builder::{Argument, CommandBuilder};
pub use command::{Command, CombinedOutputBuilder};
pub use executor::{ExecError, Executor, Mode, ProcessOutput, ProcessRunner, ShellRunner};

/// Quote a string for safe use as a single shell word.
///
/// Strings made only of characters the shell never interprets are returned
/// unchanged, everything else is wrapped in single quotes with embedded single
/// quotes escaped.
#[must_use]
pub fn quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-' | '_' | '=' | ':' | ',' | '@' | '+')
    }) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Substitute `%s` placeholders in `template` with `values`, in order.
///
/// `%%` yields a literal percent sign. Placeholders without a matching value
/// are replaced by an empty string.
#[must_use]
pub fn format_template(template: &str, values: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut values = values.iter();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('s') => {
                chars.next();
                if let Some(value) = values.next() {
                    out.push_str(value);
                }
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }
    out
}
