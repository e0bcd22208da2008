//! Target platforms for the image the layers are attached to.
//!
//! Config files list platforms either as `"os/arch"` strings or as tables
//! with `os` and `architecture` keys. Both are resolved to `os/arch` strings
//! here, at the config boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform used when none is configured.
pub const DEFAULT_PLATFORM: &str = "linux/amd64";

/// A platform entry as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Platform {
    /// `"linux/arm64"`
    Simple(String),
    /// `{ os = "linux", architecture = "arm64" }`
    Structured {
        #[serde(default)]
        os: String,
        #[serde(default)]
        architecture: String,
    },
}

impl Platform {
    /// The `os/arch` form, or `None` for an incomplete entry.
    pub fn resolve(&self) -> Option<String> {
        match self {
            Platform::Simple(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Platform::Simple(_) => None,
            Platform::Structured { os, architecture } => {
                if os.is_empty() || architecture.is_empty() {
                    None
                } else {
                    Some(format!("{}/{}", os, architecture))
                }
            }
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolve() {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "<incomplete platform>"),
        }
    }
}

/// Resolve configured platforms, dropping incomplete entries.
///
/// Falls back to [`DEFAULT_PLATFORM`] when nothing usable is left.
pub fn resolve_platforms(entries: &[Platform]) -> Vec<String> {
    let resolved = entries
        .iter()
        .filter_map(Platform::resolve)
        .collect::<Vec<_>>();
    if resolved.is_empty() {
        vec![DEFAULT_PLATFORM.to_string()]
    } else {
        resolved
    }
}
