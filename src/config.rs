//! Layer build configuration files.
//!
//! A file holds global and per-layer properties, layer entries, target
//! platforms and the image creation time. Unknown keys are rejected.
//! `.json` files are parsed as JSON, anything else as TOML.
//!
//! ```toml
//! creationTime = "2024-01-01T00:00:00Z"
//! platforms = ["linux/amd64", { os = "linux", architecture = "arm64" }]
//!
//! [layers.properties]
//! filePermissions = "644"
//!
//! [[layers.entries]]
//! name = "app"
//!
//! [[layers.entries.files]]
//! src = "build/app"
//! dest = "/opt/app/"
//! excludes = ["*.log"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::layer::{validate_layer_names, LayerSpec};
use crate::platform::{resolve_platforms, Platform};
use crate::properties::PropertySet;

/// The `layers` table: global properties plus ordered layer entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LayersConfig {
    #[serde(default)]
    pub properties: PropertySet,
    #[serde(default)]
    pub entries: Vec<LayerSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BuildConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub layers: LayersConfig,
}

impl BuildConfig {
    pub fn resolved_platforms(&self) -> Vec<String> {
        resolve_platforms(&self.platforms)
    }
}

/// Load a build config and resolve relative sources against its directory.
pub fn load_build_config(config_path: &Path) -> Result<BuildConfig> {
    let contents = fs::read_to_string(config_path)
        .with_context(|| format!("reading layer config '{}'", config_path.display()))?;
    let mut config = parse_build_config(&contents, config_path)?;

    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    for layer in &mut config.layers.entries {
        for file in &mut layer.files {
            file.src = resolve_source_path(base_dir, &file.src);
        }
    }

    validate_layer_names(&config.layers.entries)
        .with_context(|| format!("invalid layer config '{}'", config_path.display()))?;
    Ok(config)
}

fn parse_build_config(contents: &str, config_path: &Path) -> Result<BuildConfig> {
    let is_json = config_path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(contents)
            .with_context(|| format!("parsing layer config '{}'", config_path.display()))
    } else {
        toml::from_str(contents)
            .with_context(|| format!("parsing layer config '{}'", config_path.display()))
    }
}

fn resolve_source_path(base_dir: &Path, src: &Path) -> PathBuf {
    if src.is_absolute() {
        src.to_path_buf()
    } else {
        base_dir.join(src)
    }
}
