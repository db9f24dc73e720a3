use std::io::{IsTerminal, Write};
use std::time::Instant;

use anstyle::{AnsiColor, Style};
use log::{Level, Log, Metadata, Record};
use parking_lot::Mutex;

struct ClisyncLogger {
    file: Option<Mutex<std::fs::File>>,
    filter: log::LevelFilter,
    color: bool,
    start: Instant,
}

impl Log for ClisyncLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.filter
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(record.level(), &record.args().to_string(), self.color);
        let _ = writeln!(std::io::stderr().lock(), "{line}");

        if let Some(ref file) = self.file {
            let elapsed = self.start.elapsed().as_secs_f64();
            let _ = writeln!(
                file.lock(),
                "[{elapsed:.3}s] [{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
        if let Some(ref file) = self.file {
            let _ = file.lock().flush();
        }
    }
}

/// Console style for a log level.
#[must_use]
pub fn level_style(level: Level) -> Style {
    match level {
        Level::Error => Style::new().fg_color(Some(AnsiColor::Red.into())).bold(),
        Level::Warn => Style::new().fg_color(Some(AnsiColor::Yellow.into())),
        Level::Info => Style::new().fg_color(Some(AnsiColor::Green.into())),
        Level::Debug | Level::Trace => Style::new().dimmed(),
    }
}

fn format_line(level: Level, message: &str, color: bool) -> String {
    let prefix = match level {
        Level::Info => String::new(),
        other => format!("{}: ", other.as_str().to_lowercase()),
    };
    if color {
        let style = level_style(level);
        format!("{}{prefix}{message}{}", style.render(), style.render_reset())
    } else {
        format!("{prefix}{message}")
    }
}

/// Initialize the global logger, writing to stderr and optionally to `log_file`.
///
/// The level is taken from `RUST_LOG` (default `info`).
///
/// # Errors
///
/// Returns `SetLoggerError` if a logger is already installed.
pub fn init(log_file: Option<std::fs::File>) -> Result<(), log::SetLoggerError> {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(log::LevelFilter::Info);

    let logger = ClisyncLogger {
        file: log_file.map(Mutex::new),
        filter,
        color: std::io::stderr().is_terminal(),
        start: Instant::now(),
    };

    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(filter);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line_plain() {
        assert_eq!(format_line(Level::Info, "Rsync from a to b", false), "Rsync from a to b");
        assert_eq!(
            format_line(Level::Error, "No rsync path configuration found", false),
            "error: No rsync path configuration found"
        );
    }

    #[test]
    fn test_format_line_colored_resets() {
        let line = format_line(Level::Warn, "filesync disabled", true);
        assert!(line.starts_with("\x1b["));
        assert!(line.ends_with("\x1b[0m"));
        assert!(line.contains("warn: filesync disabled"));
    }
}
