//! Glob-style path patterns used by mapping include/exclude lists.
//!
//! Supported tokens:
//! - `**` - any run of characters, crossing `/`
//! - `*` - any run of characters within one path segment
//! - `?` - exactly one character
//!
//! Everything else is literal, including `.`, `[`, `{` and `!`. Matching is
//! case-sensitive and anchored at both ends. `\` is treated as a separator in
//! both the pattern and the candidate.

use anyhow::{Context, Result};
use regex::Regex;

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a glob pattern.
    pub fn new(raw: &str) -> Result<Self> {
        let normalized = normalize_separators(raw);
        let regex = Regex::new(&glob_to_regex(&normalized))
            .with_context(|| format!("Failed to compile pattern '{}'", raw))?;
        Ok(Self {
            raw: raw.to_string(),
            regex,
        })
    }

    /// The pattern as written in the configuration.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Test a relative path against this pattern.
    pub fn matches(&self, path: &str) -> bool {
        if path == self.raw {
            return true;
        }
        self.regex.is_match(&normalize_separators(path))
    }
}

/// An ordered list of compiled patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(raw: &[S]) -> Result<Self> {
        let patterns = raw
            .iter()
            .map(|p| Pattern::new(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// First pattern matching `path`, if any.
    pub fn first_match(&self, path: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.matches(path))
    }

    pub fn matches_any(&self, path: &str) -> bool {
        self.first_match(path).is_some()
    }
}

/// Test `path` against a single uncompiled pattern.
///
/// A pattern that fails to compile never matches.
pub fn matches_pattern(path: &str, pattern: &str) -> bool {
    if path == pattern {
        return true;
    }
    Pattern::new(pattern)
        .map(|p| p.matches(path))
        .unwrap_or(false)
}

fn normalize_separators(s: &str) -> String {
    s.replace('\\', "/")
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        let token = match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                "(?s:.*)"
            }
            '*' => "[^/]*",
            '?' => "(?s:.)",
            _ => {
                literal.push(c);
                continue;
            }
        };
        out.push_str(&regex::escape(&literal));
        literal.clear();
        out.push_str(token);
    }
    out.push_str(&regex::escape(&literal));
    out.push('$');
    out
}
