//! Include/exclude decision for mapping entries.

use anyhow::Result;

use crate::pattern::PatternSet;

/// Outcome of checking a path against a mapping's filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Included,
    /// Matched an exclude pattern. Excludes win over includes.
    Excluded,
    /// Includes were given and none of them matched.
    NotIncluded,
}

impl Verdict {
    pub fn is_included(self) -> bool {
        matches!(self, Verdict::Included)
    }
}

/// Compiled exclude/include lists for one file mapping.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    excludes: PatternSet,
    includes: PatternSet,
}

impl Filter {
    pub fn new<S: AsRef<str>>(excludes: &[S], includes: &[S]) -> Result<Self> {
        Ok(Self {
            excludes: PatternSet::new(excludes)?,
            includes: PatternSet::new(includes)?,
        })
    }

    pub fn decide(&self, path: &str) -> Verdict {
        if self.excludes.is_empty() && self.includes.is_empty() {
            return Verdict::Included;
        }
        if self.excludes.matches_any(path) {
            return Verdict::Excluded;
        }
        if !self.includes.is_empty() && !self.includes.matches_any(path) {
            return Verdict::NotIncluded;
        }
        Verdict::Included
    }
}

/// One-shot form of [`Filter::decide`] over raw pattern strings.
pub fn should_include<S: AsRef<str>>(path: &str, excludes: &[S], includes: &[S]) -> bool {
    Filter::new(excludes, includes)
        .map(|f| f.decide(path).is_included())
        .unwrap_or(false)
}
