//! Deterministic tar layers for container images.
//!
//! Given layer specs (file mappings plus ownership, permission and timestamp
//! properties), this crate writes one uncompressed tar archive per layer.
//! Header fields come from configuration rather than the host filesystem, so
//! the same inputs produce byte-identical archives on any machine.
//!
//! # Architecture
//!
//! ```text
//! config ──► LayerSpec list ──► layer (orchestrator)
//!                                  │
//!                                  ├── properties: global → layer → mapping merge
//!                                  ├── filter / pattern: include & exclude globs
//!                                  ├── paths: destination inside the archive
//!                                  └── archive: header + content per entry
//!                                         └── timestamp: ms epoch / RFC 3339
//! ```
//!
//! Pulling base images, pushing results and manifest lists are left to the
//! caller, which attaches the returned archives to an image.
//!
//! # Example
//!
//! ```rust,ignore
//! use layer_builder::{build_layers, FileMapping, LayerSpec, PropertySet};
//! use std::path::Path;
//!
//! let layer = LayerSpec {
//!     name: "app".into(),
//!     files: vec![FileMapping {
//!         src: "target/release/app".into(),
//!         dest: "/usr/local/bin/".into(),
//!         ..Default::default()
//!     }],
//!     ..Default::default()
//! };
//! let archives = build_layers(&[layer], &PropertySet::default(), Path::new("/tmp/layers"))?;
//! ```

pub mod archive;
pub mod config;
pub mod filter;
pub mod layer;
pub mod paths;
pub mod pattern;
pub mod platform;
pub mod properties;
pub mod timestamp;

pub use archive::{ArchiveWriter, EntryHeader, EntryKind, PermissionMode, Resolved};
pub use config::{load_build_config, BuildConfig, LayersConfig};
pub use filter::{should_include, Filter, Verdict};
pub use layer::{build_layers, FileMapping, LayerBuilder, LayerSpec};
pub use pattern::{matches_pattern, Pattern, PatternSet};
pub use platform::{resolve_platforms, Platform};
pub use properties::{PropertyDefaults, PropertySet, ResolvedProperties};
pub use timestamp::{parse_creation_time, parse_timestamp, TimestampError};
