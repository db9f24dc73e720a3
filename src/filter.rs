//! Table filters applied to database dumps
//!
//! A filter is a named list of patterns. Patterns starting with `!` exclude
//! matching tables, all others include them; a filter without include patterns
//! starts from every table. Patterns written as `/expr/flags` are regular
//! expressions, anything else is a glob.

use std::collections::BTreeMap;

use glob::Pattern;
use log::debug;
use regex::Regex;

use crate::config_file::ConfigError;

/// Filters available without any configuration.
pub const BUILTIN_FILTERS: &[(&str, &[&str])] = &[(
    "typo3",
    &[
        "!cache_*",
        "!cf_*",
        "!cachingframework_*",
        "!index_*",
        "!be_sessions",
        "!fe_sessions",
        "!fe_session_data",
        "!sys_log",
        "!sys_history",
        "!sys_lockedrecords",
        "!tx_realurl_*cache",
    ],
)];

#[derive(Debug)]
enum Matcher {
    Glob(Pattern),
    Regex(Regex),
}

impl Matcher {
    fn parse(pattern: &str) -> Result<Self, ConfigError> {
        if let Some(body) = pattern.strip_prefix('/')
            && let Some(end) = body.rfind('/')
        {
            let (expr, flags) = (&body[..end], &body[end + 1..]);
            let source = if flags.is_empty() {
                expr.to_string()
            } else {
                format!("(?{flags}){expr}")
            };
            return Regex::new(&source)
                .map(Matcher::Regex)
                .map_err(|e| ConfigError::Regex {
                    source: e,
                    pattern: pattern.to_string(),
                });
        }
        Pattern::new(pattern)
            .map(Matcher::Glob)
            .map_err(|e| ConfigError::Glob {
                source: e,
                pattern: pattern.to_string(),
            })
    }

    fn is_match(&self, table: &str) -> bool {
        match self {
            Matcher::Glob(pattern) => pattern.matches(table),
            Matcher::Regex(regex) => regex.is_match(table),
        }
    }
}

#[derive(Debug)]
struct Rule {
    exclude: bool,
    matcher: Matcher,
}

/// A compiled table filter
#[derive(Debug)]
pub struct TableFilter {
    pub name: String,
    rules: Vec<Rule>,
}

impl TableFilter {
    /// Compile `patterns` into a filter.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Glob` or `ConfigError::Regex` for an invalid pattern.
    pub fn new<S: AsRef<str>>(name: &str, patterns: &[S]) -> Result<Self, ConfigError> {
        let rules = patterns
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .map(|p| {
                let (exclude, p) = match p.strip_prefix('!') {
                    Some(rest) => (true, rest),
                    None => (false, p),
                };
                Matcher::parse(p).map(|matcher| Rule { exclude, matcher })
            })
            .collect::<Result<Vec<Rule>, ConfigError>>()?;
        Ok(Self {
            name: name.to_string(),
            rules,
        })
    }

    /// Look up `name` in the configured filters, then in [`BUILTIN_FILTERS`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownFilter` if no filter has that name or the
    /// configured one has no patterns.
    pub fn resolve(
        name: &str,
        configured: &BTreeMap<String, Vec<String>>,
    ) -> Result<Self, ConfigError> {
        if let Some(patterns) = configured.get(name) {
            // An empty list names no filter at all
            if patterns.iter().all(|p| p.trim().is_empty()) {
                return Err(ConfigError::UnknownFilter(name.to_string()));
            }
            return Self::new(name, patterns.as_slice());
        }
        BUILTIN_FILTERS
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .ok_or_else(|| ConfigError::UnknownFilter(name.to_string()))
            .and_then(|(_, patterns)| Self::new(name, *patterns))
    }

    #[must_use]
    pub fn is_included(&self, table: &str) -> bool {
        let mut includes = self.rules.iter().filter(|r| !r.exclude).peekable();
        let included = includes.peek().is_none() || includes.any(|r| r.matcher.is_match(table));
        included
            && !self
                .rules
                .iter()
                .any(|r| r.exclude && r.matcher.is_match(table))
    }

    /// Tables kept by the filter, in input order.
    #[must_use]
    pub fn apply<'t>(&self, tables: impl IntoIterator<Item = &'t str>) -> Vec<String> {
        let mut kept = Vec::new();
        for table in tables {
            if self.is_included(table) {
                kept.push(table.to_string());
            } else {
                debug!("Filter {} skips data of table {table}", self.name);
            }
        }
        kept
    }
}

/// Split `SHOW TABLES` output into table names.
#[must_use]
pub fn parse_table_list(output: &str) -> Vec<&str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}
