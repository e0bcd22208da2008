//! Layer orchestration: one tar archive per layer spec.
//!
//! Layers are built strictly in declaration order, each into
//! `<out_dir>/<name>.tar`. Within a layer, mappings are applied in order and
//! directory sources are walked depth-first, sorted by file name, so the same
//! inputs always produce the same archive. Symlinks met during a walk are
//! stored as links; a mapping's own `src` is followed if it is one.
//!
//! A failure anywhere in a layer removes that layer's partial archive and
//! stops the build. Layers finished before the failure are left on disk; the
//! caller owns the output directory and decides what to discard.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::archive::ArchiveWriter;
use crate::filter::{Filter, Verdict};
use crate::paths::{descendant_destination, relative_slash_path, resolve_destination, SourceKind};
use crate::properties::{PropertyDefaults, PropertySet, ResolvedProperties};

/// One source → destination rule within a layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileMapping {
    /// File or directory on the host.
    pub src: PathBuf,
    /// Destination inside the image. For file sources a trailing `/` means
    /// "into this directory".
    pub dest: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
    #[serde(default, skip_serializing_if = "PropertySet::is_empty")]
    pub properties: PropertySet,
}

/// A named layer and its mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LayerSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "PropertySet::is_empty")]
    pub properties: PropertySet,
    #[serde(default)]
    pub files: Vec<FileMapping>,
}

/// Archive path for a layer named `name`.
pub fn layer_archive_path(out_dir: &Path, name: &str) -> PathBuf {
    out_dir.join(format!("{}.tar", name))
}

/// Check that layer names are usable as file names and unique.
pub fn validate_layer_names(layers: &[LayerSpec]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for layer in layers {
        let name = layer.name.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            bail!(
                "invalid layer name '{}': must be a non-empty file name without path separators",
                name
            );
        }
        if !seen.insert(name) {
            bail!("duplicate layer name '{}'", name);
        }
    }
    Ok(())
}

/// Build every layer into `out_dir` with default owner/group ids.
///
/// Returns archive paths in layer order.
pub fn build_layers(
    layers: &[LayerSpec],
    global: &PropertySet,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    LayerBuilder::new(out_dir)
        .with_global_properties(global.clone())
        .build(layers)
}

/// Builds layer archives into one output directory.
#[derive(Debug, Clone)]
pub struct LayerBuilder {
    out_dir: PathBuf,
    global: PropertySet,
    defaults: PropertyDefaults,
}

impl LayerBuilder {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            global: PropertySet::default(),
            defaults: PropertyDefaults::default(),
        }
    }

    pub fn with_global_properties(mut self, global: PropertySet) -> Self {
        self.global = global;
        self
    }

    pub fn with_defaults(mut self, defaults: PropertyDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Build all layers in order. Stops at the first failing layer.
    pub fn build(&self, layers: &[LayerSpec]) -> Result<Vec<PathBuf>> {
        validate_layer_names(layers)?;
        if layers.is_empty() {
            return Ok(vec![]);
        }

        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("Failed to create directory: {}", self.out_dir.display()))?;

        let mut archives = Vec::with_capacity(layers.len());
        for (index, layer) in layers.iter().enumerate() {
            tracing::debug!(index, total = layers.len(), layer = %layer.name, "building layer");
            let path = self
                .build_layer(layer)
                .with_context(|| format!("Failed to build layer '{}'", layer.name))?;
            archives.push(path);
        }
        Ok(archives)
    }

    /// Build a single layer archive.
    pub fn build_layer(&self, layer: &LayerSpec) -> Result<PathBuf> {
        let tar_path = layer_archive_path(&self.out_dir, &layer.name);
        tracing::info!(layer = %layer.name, path = %tar_path.display(), "creating layer");

        let file = File::create(&tar_path)
            .with_context(|| format!("Failed to create {}", tar_path.display()))?;
        let mut partial = PartialArchive::new(tar_path.clone());
        let own_archive = fs::canonicalize(&tar_path)
            .with_context(|| format!("Failed to resolve {}", tar_path.display()))?;

        let layer_props = self.global.merge(&layer.properties);
        let mut writer = ArchiveWriter::new(BufWriter::new(file));
        let mut job = LayerJob {
            layer: &layer.name,
            own_archive: &own_archive,
            writer: &mut writer,
            appended: 0,
        };

        for mapping in &layer.files {
            let props = layer_props.merge(&mapping.properties).resolve(&self.defaults);
            job.add_mapping(mapping, &props).with_context(|| {
                format!(
                    "failed to add '{}' -> '{}'",
                    mapping.src.display(),
                    mapping.dest
                )
            })?;
        }
        let appended = job.appended;

        let mut out = writer.finish()?;
        out.flush()
            .with_context(|| format!("Failed to write {}", tar_path.display()))?;
        drop(out);

        partial.commit();
        tracing::info!(layer = %layer.name, entries = appended, "layer complete");
        Ok(tar_path)
    }
}

/// Removes an archive on drop unless committed.
struct PartialArchive {
    path: PathBuf,
    committed: bool,
}

impl PartialArchive {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for PartialArchive {
    fn drop(&mut self) {
        if !self.committed {
            tracing::debug!(path = %self.path.display(), "removing partial layer archive");
            let _ = fs::remove_file(&self.path);
        }
    }
}

struct LayerJob<'a, W: Write> {
    layer: &'a str,
    own_archive: &'a Path,
    writer: &'a mut ArchiveWriter<W>,
    appended: usize,
}

impl<W: Write> LayerJob<'_, W> {
    fn add_mapping(&mut self, mapping: &FileMapping, props: &ResolvedProperties) -> Result<()> {
        let metadata = fs::metadata(&mapping.src)
            .with_context(|| format!("Failed to stat {}", mapping.src.display()))?;
        let filter = Filter::new(mapping.excludes.as_slice(), mapping.includes.as_slice())?;

        if metadata.is_dir() {
            self.add_directory(mapping, &filter, props)
        } else {
            self.add_file(mapping, &filter, props)
        }
    }

    fn add_file(
        &mut self,
        mapping: &FileMapping,
        filter: &Filter,
        props: &ResolvedProperties,
    ) -> Result<()> {
        let name = mapping
            .src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let verdict = filter.decide(&name);
        if !verdict.is_included() {
            tracing::debug!(layer = self.layer, path = %mapping.src.display(), ?verdict, "skipping file");
            return Ok(());
        }
        if self.is_own_archive(&mapping.src) {
            tracing::debug!(layer = self.layer, "skipping the layer's own archive");
            return Ok(());
        }

        let dest = resolve_destination(SourceKind::File, &mapping.src, &mapping.dest);
        self.append(&mapping.src, &dest, props)
    }

    fn add_directory(
        &mut self,
        mapping: &FileMapping,
        filter: &Filter,
        props: &ResolvedProperties,
    ) -> Result<()> {
        let root = mapping.src.as_path();
        let root_dest = resolve_destination(SourceKind::Directory, root, &mapping.dest);

        // Directories that failed the include list. They are emitted only
        // once something beneath them is, so every file keeps its parents.
        let mut pending: Vec<(PathBuf, String)> = Vec::new();

        let mut walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        while let Some(entry) = walker.next() {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            let path = entry.path();
            let rel = relative_slash_path(root, path).unwrap_or_default();
            let file_type = entry.file_type();

            pending.retain(|(_, dir)| rel.starts_with(&format!("{}/", dir)));

            if !rel.is_empty() {
                if file_type.is_file() && self.is_own_archive(path) {
                    tracing::debug!(layer = self.layer, "skipping the layer's own archive");
                    continue;
                }
                match filter.decide(&rel) {
                    Verdict::Included => {}
                    Verdict::Excluded => {
                        tracing::debug!(layer = self.layer, path = %path.display(), "skipping excluded");
                        if file_type.is_dir() {
                            walker.skip_current_dir();
                        }
                        continue;
                    }
                    Verdict::NotIncluded => {
                        if file_type.is_dir() {
                            pending.push((path.to_path_buf(), rel));
                        } else {
                            tracing::debug!(layer = self.layer, path = %path.display(), "skipping not included");
                        }
                        continue;
                    }
                }
            }

            if !file_type.is_dir() && !file_type.is_file() && !file_type.is_symlink() {
                tracing::warn!(layer = self.layer, path = %path.display(), "skipping special file");
                continue;
            }

            for (dir, dir_rel) in pending.drain(..) {
                let dest = descendant_destination(&root_dest, &dir_rel);
                self.append(&dir, &dest, props)?;
            }

            let dest = if rel.is_empty() {
                root_dest.clone()
            } else {
                descendant_destination(&root_dest, &rel)
            };
            if dest.is_empty() {
                // Mapped onto the archive root; there is no entry to name.
                continue;
            }
            if file_type.is_symlink() {
                self.writer.append_symlink(path, &dest, props)?;
                self.appended += 1;
            } else {
                self.append(path, &dest, props)?;
            }
        }
        Ok(())
    }

    fn append(&mut self, source: &Path, dest: &str, props: &ResolvedProperties) -> Result<()> {
        let entry = self.writer.append(source, dest, props)?;
        if entry.degraded() {
            tracing::debug!(layer = self.layer, path = dest, "entry used default header values");
        }
        self.appended += 1;
        Ok(())
    }

    fn is_own_archive(&self, path: &Path) -> bool {
        if path.file_name() != self.own_archive.file_name() {
            return false;
        }
        fs::canonicalize(path)
            .map(|p| p == self.own_archive)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    struct Entry {
        path: String,
        kind: tar::EntryType,
        mode: u32,
        uid: u64,
        gid: u64,
        mtime: u64,
        link: Option<PathBuf>,
        body: Vec<u8>,
    }

    fn read_archive(path: &Path) -> Vec<Entry> {
        let mut archive = tar::Archive::new(File::open(path).unwrap());
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let header = e.header().clone();
                let mut body = vec![];
                e.read_to_end(&mut body).unwrap();
                Entry {
                    path: e.path().unwrap().to_string_lossy().into_owned(),
                    kind: header.entry_type(),
                    mode: header.mode().unwrap(),
                    uid: header.uid().unwrap(),
                    gid: header.gid().unwrap(),
                    mtime: header.mtime().unwrap(),
                    link: header.link_name().unwrap().map(|l| l.into_owned()),
                    body,
                }
            })
            .collect()
    }

    fn names(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.path.as_str()).collect()
    }

    fn mapping(src: &Path, dest: &str) -> FileMapping {
        FileMapping {
            src: src.to_path_buf(),
            dest: dest.to_string(),
            ..Default::default()
        }
    }

    fn layer(name: &str, files: Vec<FileMapping>) -> LayerSpec {
        LayerSpec {
            name: name.to_string(),
            files,
            ..Default::default()
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn single_script_with_permission_override() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("start.sh");
        fs::write(&script, "#!/bin/sh\nexec app\n").unwrap();
        let out = temp.path().join("out");

        let mut m = mapping(&script, "/home/run.sh");
        m.properties.file_permissions = Some("755".into());
        let paths = build_layers(&[layer("app", vec![m])], &PropertySet::default(), &out).unwrap();

        assert_eq!(paths, vec![out.join("app.tar")]);
        let entries = read_archive(&paths[0]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "home/run.sh");
        assert_eq!(entries[0].kind, tar::EntryType::Regular);
        assert_eq!(entries[0].mode, 0o755);
        assert_eq!(entries[0].uid, 0);
        assert_eq!(entries[0].gid, 0);
    }

    #[test]
    fn directory_round_trip_with_overrides() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("site");
        write(&src, "index.html", "<h1>hi</h1>");
        write(&src, "css/main.css", "body {}");
        write(&src, "js/app.js", "console.log(1)");
        write(&src, "js/vendor/lib.js", "lib");

        let global = PropertySet {
            file_permissions: Some("600".into()),
            directory_permissions: Some("700".into()),
            user: Some("1000".into()),
            group: Some("1000".into()),
            timestamp: Some("1700000000000".into()),
        };
        let out = temp.path().join("out");
        let paths = build_layers(&[layer("web", vec![mapping(&src, "/srv/www/")])], &global, &out)
            .unwrap();

        let entries = read_archive(&paths[0]);
        assert_eq!(
            names(&entries),
            vec![
                "srv/www",
                "srv/www/css",
                "srv/www/css/main.css",
                "srv/www/index.html",
                "srv/www/js",
                "srv/www/js/app.js",
                "srv/www/js/vendor",
                "srv/www/js/vendor/lib.js",
            ]
        );
        for e in &entries {
            assert_eq!(e.uid, 1000);
            assert_eq!(e.gid, 1000);
            assert_eq!(e.mtime, 1_700_000_000);
            match e.kind {
                tar::EntryType::Directory => assert_eq!(e.mode, 0o700),
                _ => assert_eq!(e.mode, 0o600),
            }
        }

        let extracted = temp.path().join("extracted");
        tar::Archive::new(File::open(&paths[0]).unwrap())
            .unpack(&extracted)
            .unwrap();
        let lib = entries.iter().find(|e| e.path == "srv/www/js/vendor/lib.js").unwrap();
        assert_eq!(lib.body, b"lib");
        assert!(entries
            .iter()
            .filter(|e| e.kind == tar::EntryType::Directory)
            .all(|e| e.body.is_empty()));

        for rel in ["index.html", "css/main.css", "js/app.js", "js/vendor/lib.js"] {
            assert_eq!(
                fs::read(extracted.join("srv/www").join(rel)).unwrap(),
                fs::read(src.join(rel)).unwrap()
            );
        }
    }

    #[test]
    fn filters_apply_relative_to_mapping_root() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src, "file1.txt", "content1");
        write(&src, "file2.md", "content2");
        write(&src, "subdir/file3.txt", "content3");
        write(&src, "subdir/file4.md", "content4");

        let mut m = mapping(&src, "/data");
        m.excludes = vec!["*.md".into(), "**/*.md".into()];
        m.includes = vec!["*.txt".into(), "**/*.txt".into()];
        let out = temp.path().join("out");
        let paths =
            build_layers(&[layer("docs", vec![m])], &PropertySet::default(), &out).unwrap();

        let entries = read_archive(&paths[0]);
        assert_eq!(
            names(&entries),
            vec!["data", "data/file1.txt", "data/subdir", "data/subdir/file3.txt"]
        );
    }

    #[test]
    fn excluded_directory_is_pruned() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("proj");
        write(&src, "main.rs", "fn main() {}");
        write(&src, "target/debug/proj", "bin");
        write(&src, "target/notes.txt", "x");

        let mut m = mapping(&src, "/app/");
        m.excludes = vec!["target".into()];
        let out = temp.path().join("out");
        let paths = build_layers(&[layer("l", vec![m])], &PropertySet::default(), &out).unwrap();

        assert_eq!(names(&read_archive(&paths[0])), vec!["app", "app/main.rs"]);
    }

    #[test]
    fn directories_without_included_content_are_omitted() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src, "a/keep.conf", "k");
        write(&src, "b/drop.bin", "d");

        let mut m = mapping(&src, "/etc/app");
        m.includes = vec!["**/*.conf".into()];
        let out = temp.path().join("out");
        let paths = build_layers(&[layer("l", vec![m])], &PropertySet::default(), &out).unwrap();

        assert_eq!(
            names(&read_archive(&paths[0])),
            vec!["etc/app", "etc/app/a", "etc/app/a/keep.conf"]
        );
    }

    #[test]
    fn file_mapping_filters_on_base_name() {
        let temp = TempDir::new().unwrap();
        let readme = temp.path().join("README.md");
        let binary = temp.path().join("tool");
        fs::write(&readme, "docs").unwrap();
        fs::write(&binary, "elf").unwrap();

        let mut skip = mapping(&readme, "/usr/share/doc/");
        skip.excludes = vec!["*.md".into()];
        let keep = mapping(&binary, "/usr/bin/");
        let out = temp.path().join("out");
        let paths = build_layers(&[layer("l", vec![skip, keep])], &PropertySet::default(), &out)
            .unwrap();

        assert_eq!(names(&read_archive(&paths[0])), vec!["usr/bin/tool"]);
    }

    #[test]
    fn own_archive_is_never_included() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("ctx");
        write(&src, "a.txt", "a");
        write(&src, "self.tar", "stale");

        let paths = build_layers(
            &[layer("self", vec![mapping(&src, "/")])],
            &PropertySet::default(),
            &src,
        )
        .unwrap();

        assert_eq!(paths, vec![src.join("self.tar")]);
        let entries = read_archive(&paths[0]);
        assert_eq!(names(&entries), vec!["a.txt"]);
    }

    #[test]
    fn mapping_properties_override_layer_and_global() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        let global = PropertySet {
            file_permissions: Some("644".into()),
            user: Some("1".into()),
            timestamp: Some("2020-01-01T00:00:00Z".into()),
            ..Default::default()
        };
        let mut spec = layer("l", vec![mapping(&a, "/a"), mapping(&b, "/b")]);
        spec.properties.user = Some("2".into());
        spec.files[1].properties.user = Some("3".into());
        spec.files[1].properties.file_permissions = Some("400".into());

        let out = temp.path().join("out");
        let paths = build_layers(&[spec], &global, &out).unwrap();
        let entries = read_archive(&paths[0]);

        assert_eq!((entries[0].uid, entries[0].mode), (2, 0o644));
        assert_eq!((entries[1].uid, entries[1].mode), (3, 0o400));
        assert!(entries.iter().all(|e| e.mtime == 1_577_836_800));
    }

    #[test]
    fn failing_layer_removes_partial_archive() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("good.txt");
        fs::write(&good, "ok").unwrap();
        let out = temp.path().join("out");

        let layers = vec![
            layer("first", vec![mapping(&good, "/good.txt")]),
            layer(
                "second",
                vec![
                    mapping(&good, "/good.txt"),
                    mapping(&temp.path().join("missing"), "/missing"),
                ],
            ),
            layer("third", vec![mapping(&good, "/good.txt")]),
        ];
        let err = build_layers(&layers, &PropertySet::default(), &out).unwrap_err();

        let msg = format!("{:#}", err);
        assert!(msg.contains("second"), "{msg}");
        assert!(msg.contains("missing"), "{msg}");
        assert!(out.join("first.tar").exists());
        assert!(!out.join("second.tar").exists());
        assert!(!out.join("third.tar").exists());
    }

    #[test]
    fn paths_follow_declaration_order() {
        let temp = TempDir::new().unwrap();
        let f = temp.path().join("f");
        fs::write(&f, "f").unwrap();
        let out = temp.path().join("out");

        let layers = vec![
            layer("zeta", vec![mapping(&f, "/f")]),
            layer("alpha", vec![mapping(&f, "/f")]),
            layer("empty", vec![]),
        ];
        let paths = build_layers(&layers, &PropertySet::default(), &out).unwrap();
        assert_eq!(
            paths,
            vec![out.join("zeta.tar"), out.join("alpha.tar"), out.join("empty.tar")]
        );
        assert!(read_archive(&paths[2]).is_empty());
    }

    #[test]
    fn builds_are_reproducible() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        for name in ["c", "a", "b/x", "b/y"] {
            write(&src, name, name);
        }
        let global = PropertySet {
            timestamp: Some("0".into()),
            ..Default::default()
        };
        let layers = vec![layer("l", vec![mapping(&src, "/opt")])];

        let one = build_layers(&layers, &global, &temp.path().join("one")).unwrap();
        let two = build_layers(&layers, &global, &temp.path().join("two")).unwrap();
        assert_eq!(fs::read(&one[0]).unwrap(), fs::read(&two[0]).unwrap());
    }

    #[test]
    fn custom_defaults_apply_when_unset() {
        let temp = TempDir::new().unwrap();
        let f = temp.path().join("f");
        fs::write(&f, "f").unwrap();

        let builder = LayerBuilder::new(temp.path().join("out")).with_defaults(PropertyDefaults {
            user: "65534".into(),
            group: "65534".into(),
        });
        let paths = builder.build(&[layer("l", vec![mapping(&f, "/f")])]).unwrap();
        let entries = read_archive(&paths[0]);
        assert_eq!((entries[0].uid, entries[0].gid), (65534, 65534));
    }

    #[test]
    fn same_destination_keeps_both_entries_in_order() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("base.conf");
        let site = temp.path().join("site.conf");
        fs::write(&base, "first").unwrap();
        fs::write(&site, "second").unwrap();

        let out = temp.path().join("out");
        let paths = build_layers(
            &[layer(
                "l",
                vec![mapping(&base, "/etc/app.conf"), mapping(&site, "/etc/app.conf")],
            )],
            &PropertySet::default(),
            &out,
        )
        .unwrap();

        let entries = read_archive(&paths[0]);
        assert_eq!(names(&entries), vec!["etc/app.conf", "etc/app.conf"]);
        assert_eq!(entries[0].body, b"first");
        assert_eq!(entries[1].body, b"second");
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_stored_not_followed() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src, "a.txt", "a");
        write(temp.path(), "outside/secret", "s");
        symlink("/nonexistent/target", src.join("dangling")).unwrap();
        symlink("../outside", src.join("link")).unwrap();

        let mut m = mapping(&src, "/app");
        m.properties.user = Some("5".into());
        let out = temp.path().join("out");
        let paths = build_layers(&[layer("l", vec![m])], &PropertySet::default(), &out).unwrap();

        let entries = read_archive(&paths[0]);
        assert_eq!(names(&entries), vec!["app", "app/a.txt", "app/dangling", "app/link"]);
        assert_eq!(entries[2].kind, tar::EntryType::Symlink);
        assert_eq!(entries[2].link, Some(PathBuf::from("/nonexistent/target")));
        assert_eq!(entries[3].kind, tar::EntryType::Symlink);
        assert_eq!(entries[3].link, Some(PathBuf::from("../outside")));
        assert_eq!(entries[3].uid, 5);
        assert!(entries[3].body.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn excluded_symlink_is_skipped() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src, "a.txt", "a");
        symlink("a.txt", src.join("alias")).unwrap();

        let mut m = mapping(&src, "/app");
        m.excludes = vec!["alias".into()];
        let out = temp.path().join("out");
        let paths = build_layers(&[layer("l", vec![m])], &PropertySet::default(), &out).unwrap();
        assert_eq!(names(&read_archive(&paths[0])), vec!["app", "app/a.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn fifo_is_skipped() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src, "a.txt", "a");
        let status = std::process::Command::new("mkfifo")
            .arg(src.join("pipe"))
            .status()
            .unwrap();
        assert!(status.success());

        let out = temp.path().join("out");
        let paths = build_layers(
            &[layer("l", vec![mapping(&src, "/app")])],
            &PropertySet::default(),
            &out,
        )
        .unwrap();
        assert_eq!(names(&read_archive(&paths[0])), vec!["app", "app/a.txt"]);
    }

    #[test]
    fn mapping_failure_names_layer_once() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let err = build_layers(
            &[layer("base", vec![mapping(&temp.path().join("gone"), "/gone")])],
            &PropertySet::default(),
            &out,
        )
        .unwrap_err();

        let msg = format!("{:#}", err);
        assert_eq!(msg.matches("'base'").count(), 1, "{msg}");
        assert!(msg.contains("failed to add"), "{msg}");
    }

    #[test]
    fn layer_names_are_validated() {
        assert!(validate_layer_names(&[layer("a", vec![]), layer("b", vec![])]).is_ok());
        assert!(validate_layer_names(&[layer("a", vec![]), layer("a", vec![])]).is_err());
        assert!(validate_layer_names(&[layer("", vec![])]).is_err());
        assert!(validate_layer_names(&[layer("../x", vec![])]).is_err());
        assert!(validate_layer_names(&[layer("..", vec![])]).is_err());
    }

    #[test]
    fn no_layers_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let paths = build_layers(&[], &PropertySet::default(), &out).unwrap();
        assert!(paths.is_empty());
        assert!(!out.exists());
    }
}
