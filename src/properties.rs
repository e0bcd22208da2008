//! Layer properties and their global → layer → mapping merge.
//!
//! Every field is an optional string; an empty string counts as unset so that
//! a blank value in a config file inherits from the broader scope instead of
//! clobbering it. Values are only interpreted (octal modes, numeric ids,
//! timestamps) when an archive header is written.

use serde::{Deserialize, Serialize};

/// Owner and group ids used when no scope sets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefaults {
    pub user: String,
    pub group: String,
}

impl Default for PropertyDefaults {
    fn default() -> Self {
        Self {
            user: "0".to_string(),
            group: "0".to_string(),
        }
    }
}

/// Properties configurable at global, layer and mapping scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PropertySet {
    /// Octal mode for regular files, e.g. `"644"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_permissions: Option<String>,
    /// Octal mode for directories, e.g. `"755"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_permissions: Option<String>,
    /// Numeric owner id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Numeric group id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Millisecond epoch or RFC 3339 date-time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl PropertySet {
    /// Merge `specific` over `self`. Set fields of `specific` win.
    pub fn merge(&self, specific: &PropertySet) -> PropertySet {
        PropertySet {
            file_permissions: pick(&self.file_permissions, &specific.file_permissions),
            directory_permissions: pick(
                &self.directory_permissions,
                &specific.directory_permissions,
            ),
            user: pick(&self.user, &specific.user),
            group: pick(&self.group, &specific.group),
            timestamp: pick(&self.timestamp, &specific.timestamp),
        }
    }

    /// Finish a merge chain, filling owner/group from `defaults`.
    pub fn resolve(&self, defaults: &PropertyDefaults) -> ResolvedProperties {
        ResolvedProperties {
            file_permissions: non_empty(&self.file_permissions),
            directory_permissions: non_empty(&self.directory_permissions),
            user: non_empty(&self.user).unwrap_or_else(|| defaults.user.clone()),
            group: non_empty(&self.group).unwrap_or_else(|| defaults.group.clone()),
            timestamp: non_empty(&self.timestamp),
        }
    }

    /// True when no field carries a value.
    pub fn is_empty(&self) -> bool {
        [
            &self.file_permissions,
            &self.directory_permissions,
            &self.user,
            &self.group,
            &self.timestamp,
        ]
        .iter()
        .all(|f| non_empty(f).is_none())
    }
}

/// Final property values for the entries of one mapping.
///
/// Permission and timestamp strings stay optional: the archive writer owns
/// their fallbacks because they depend on the entry kind and source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProperties {
    pub file_permissions: Option<String>,
    pub directory_permissions: Option<String>,
    pub user: String,
    pub group: String,
    pub timestamp: Option<String>,
}

impl Default for ResolvedProperties {
    fn default() -> Self {
        PropertySet::default().resolve(&PropertyDefaults::default())
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

fn pick(broad: &Option<String>, specific: &Option<String>) -> Option<String> {
    non_empty(specific).or_else(|| broad.clone())
}
