//! In-archive destination paths.
//!
//! Archive paths are relative and slash-separated: `/home/run.sh` is stored
//! as `home/run.sh`, and a host drive prefix such as `C:\data` becomes the
//! leading segment `C/data`.

use std::path::{Component, Path};

/// Kind of a mapping source on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    File,
    Directory,
}

/// Archive path for the source of a mapping.
///
/// Directory sources always treat `dest` as a directory. File sources treat
/// `dest` as a directory only when it ends with a separator, in which case
/// the source's file name is appended.
pub fn resolve_destination(kind: SourceKind, source: &Path, dest: &str) -> String {
    match kind {
        SourceKind::Directory => to_archive_path(dest),
        SourceKind::File if ends_with_separator(dest) => {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            to_archive_path(&format!("{}/{}", dest, name))
        }
        SourceKind::File => to_archive_path(dest),
    }
}

/// Archive path of a descendant `relative` below a directory destination.
pub fn descendant_destination(dir_destination: &str, relative: &str) -> String {
    to_archive_path(&format!("{}/{}", dir_destination, relative))
}

/// Normalize a destination string into an archive path.
pub fn to_archive_path(raw: &str) -> String {
    let mut slashed = raw.replace('\\', "/");
    let bytes = slashed.as_bytes();
    if bytes.len() > 1 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        let drive = (bytes[0] as char).to_ascii_uppercase();
        slashed = format!("/{}{}", drive, &slashed[2..]);
    }

    slashed
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// `path` relative to `root`, slash-separated. Empty for the root itself.
pub fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let segments = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(seg) => Some(seg.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>();
    Some(segments.join("/"))
}

fn ends_with_separator(dest: &str) -> bool {
    dest.ends_with('/') || dest.ends_with('\\')
}
