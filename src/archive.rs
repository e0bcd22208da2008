//! Tar entry writer for layer archives.
//!
//! Header fields come from [`ResolvedProperties`] rather than the live
//! filesystem, so two hosts archiving the same tree produce the same bytes.
//! The source's metadata is only consulted as a fallback:
//!
//! | field      | configured as             | fallback                      |
//! |------------|---------------------------|-------------------------------|
//! | mode       | octal string (`"755"`)    | `0755` dirs, `0644` files     |
//! | uid / gid  | decimal string            | `0`                           |
//! | mtime      | ms epoch or RFC 3339      | source modification time      |
//!
//! The resolved time is written to mtime, atime and ctime alike. Symlinks
//! are stored as links with mode `0777` and never followed.

use anyhow::{bail, Context, Result};
use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

use crate::properties::ResolvedProperties;
use crate::timestamp::{parse_timestamp, unix_seconds};

pub const DEFAULT_DIRECTORY_MODE: u32 = 0o755;
pub const DEFAULT_FILE_MODE: u32 = 0o644;
pub const SYMLINK_MODE: u32 = 0o777;

const MAX_MODE: u32 = 0o7777;

/// Kind of an archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
}

/// A header field value, tagged with where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<T> {
    /// Parsed from the configured property.
    Configured(T),
    /// Property unset or unparseable; the documented default was used.
    Defaulted(T),
}

impl<T: Copy> Resolved<T> {
    pub fn value(&self) -> T {
        match self {
            Resolved::Configured(v) | Resolved::Defaulted(v) => *v,
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Resolved::Defaulted(_))
    }
}

/// How entry permissions are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PermissionMode {
    /// Use configured permissions, falling back to fixed defaults.
    #[default]
    Normalize,
    /// Copy permission bits from the source file.
    Preserve,
}

/// Header values of one written entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    pub mode: Resolved<u32>,
    pub uid: Resolved<u64>,
    pub gid: Resolved<u64>,
    pub mtime: Resolved<OffsetDateTime>,
    /// Link target, for symlinks.
    pub link_name: Option<PathBuf>,
}

impl EntryHeader {
    /// Resolve header values for a source with the given metadata.
    pub fn resolve(
        path: &str,
        metadata: &Metadata,
        props: &ResolvedProperties,
        permissions: PermissionMode,
    ) -> Self {
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else if metadata.file_type().is_symlink() {
            EntryKind::Symlink
        } else {
            EntryKind::File
        };
        Self {
            path: path.to_string(),
            kind,
            size: if kind == EntryKind::File {
                metadata.len()
            } else {
                0
            },
            mode: resolve_mode(kind, metadata, props, permissions),
            uid: resolve_id(&props.user),
            gid: resolve_id(&props.group),
            mtime: resolve_mtime(props.timestamp.as_deref(), metadata),
            link_name: None,
        }
    }

    /// True if any field fell back to its default.
    pub fn degraded(&self) -> bool {
        self.mode.is_defaulted()
            || self.uid.is_defaulted()
            || self.gid.is_defaulted()
            || self.mtime.is_defaulted()
    }

    fn to_tar_header(&self) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(match self.kind {
            EntryKind::Directory => tar::EntryType::Directory,
            EntryKind::File => tar::EntryType::Regular,
            EntryKind::Symlink => tar::EntryType::Symlink,
        });
        header.set_size(self.size);
        header.set_mode(self.mode.value());
        header.set_uid(self.uid.value());
        header.set_gid(self.gid.value());

        let secs = unix_seconds(self.mtime.value());
        header.set_mtime(secs);
        if let Some(gnu) = header.as_gnu_mut() {
            gnu.set_atime(secs);
            gnu.set_ctime(secs);
        }
        header.set_cksum();
        header
    }
}

/// Appends filesystem entries to an uncompressed tar stream.
pub struct ArchiveWriter<W: Write> {
    builder: tar::Builder<W>,
    permissions: PermissionMode,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            builder: tar::Builder::new(inner),
            permissions: PermissionMode::Normalize,
        }
    }

    pub fn with_permissions(mut self, permissions: PermissionMode) -> Self {
        self.permissions = permissions;
        self
    }

    /// Append `source` as `archive_path`.
    ///
    /// Directories get a header only; regular files are followed by their
    /// full content.
    pub fn append(
        &mut self,
        source: &Path,
        archive_path: &str,
        props: &ResolvedProperties,
    ) -> Result<EntryHeader> {
        if archive_path.is_empty() {
            bail!("empty archive path for {}", source.display());
        }

        let metadata = fs::metadata(source)
            .with_context(|| format!("Failed to stat {}", source.display()))?;

        if metadata.is_dir() {
            let entry = EntryHeader::resolve(archive_path, &metadata, props, self.permissions);
            self.write(&entry, std::io::empty())
                .with_context(|| format!("Failed to write header for {}", source.display()))?;
            return Ok(entry);
        }

        if !metadata.is_file() {
            bail!("unsupported file type: {}", source.display());
        }

        let file = File::open(source)
            .with_context(|| format!("Failed to open {}", source.display()))?;
        // Size from the open handle so header and body agree.
        let metadata = file
            .metadata()
            .with_context(|| format!("Failed to stat {}", source.display()))?;
        let entry = EntryHeader::resolve(archive_path, &metadata, props, self.permissions);
        self.write(&entry, file.take(entry.size)).with_context(|| {
            format!(
                "Failed to write {} to archive as {}",
                source.display(),
                archive_path
            )
        })?;
        Ok(entry)
    }

    /// Append the symlink `source` itself as `archive_path`.
    ///
    /// The link target is stored verbatim; it need not exist.
    pub fn append_symlink(
        &mut self,
        source: &Path,
        archive_path: &str,
        props: &ResolvedProperties,
    ) -> Result<EntryHeader> {
        if archive_path.is_empty() {
            bail!("empty archive path for {}", source.display());
        }

        let metadata = fs::symlink_metadata(source)
            .with_context(|| format!("Failed to stat {}", source.display()))?;
        if !metadata.file_type().is_symlink() {
            bail!("not a symlink: {}", source.display());
        }
        let target = fs::read_link(source)
            .with_context(|| format!("Failed to read link {}", source.display()))?;

        let mut entry = EntryHeader::resolve(archive_path, &metadata, props, self.permissions);
        entry.link_name = Some(target.clone());
        let mut header = entry.to_tar_header();
        self.builder
            .append_link(&mut header, &entry.path, &target)
            .with_context(|| {
                format!(
                    "Failed to write link {} to archive as {}",
                    source.display(),
                    archive_path
                )
            })?;
        Ok(entry)
    }

    /// Write the end-of-archive blocks and return the inner stream.
    pub fn finish(self) -> Result<W> {
        self.builder
            .into_inner()
            .with_context(|| "Failed to finalize tar builder")
    }

    fn write<R: Read>(&mut self, entry: &EntryHeader, data: R) -> Result<()> {
        let mut header = entry.to_tar_header();
        let mut body = CountingReader::new(data);
        self.builder
            .append_data(&mut header, &entry.path, &mut body)?;
        // The tar builder pads a short body without complaint.
        if body.count != entry.size {
            bail!(
                "{}: header declares {} bytes but {} were read; source changed while archiving",
                entry.path,
                entry.size,
                body.count
            );
        }
        Ok(())
    }
}

struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

fn resolve_mode(
    kind: EntryKind,
    metadata: &Metadata,
    props: &ResolvedProperties,
    permissions: PermissionMode,
) -> Resolved<u32> {
    let default = match kind {
        EntryKind::Directory => DEFAULT_DIRECTORY_MODE,
        EntryKind::File => DEFAULT_FILE_MODE,
        EntryKind::Symlink => return Resolved::Configured(SYMLINK_MODE),
    };

    if permissions == PermissionMode::Preserve {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            return Resolved::Configured(metadata.permissions().mode() & MAX_MODE);
        }
        #[cfg(not(unix))]
        {
            let _ = metadata;
            return Resolved::Defaulted(default);
        }
    }

    let configured = match kind {
        EntryKind::Directory => props.directory_permissions.as_deref(),
        EntryKind::File | EntryKind::Symlink => props.file_permissions.as_deref(),
    };
    match configured.and_then(parse_mode) {
        Some(mode) => Resolved::Configured(mode),
        None => {
            if let Some(raw) = configured {
                tracing::debug!(value = raw, "unparseable permissions, using default");
            }
            Resolved::Defaulted(default)
        }
    }
}

fn resolve_id(raw: &str) -> Resolved<u64> {
    match raw.trim().parse::<u64>() {
        Ok(id) => Resolved::Configured(id),
        Err(_) => {
            tracing::debug!(value = raw, "unparseable owner/group id, using 0");
            Resolved::Defaulted(0)
        }
    }
}

fn resolve_mtime(raw: Option<&str>, metadata: &Metadata) -> Resolved<OffsetDateTime> {
    if let Some(raw) = raw {
        match parse_timestamp(raw) {
            Ok(ts) => return Resolved::Configured(ts),
            Err(err) => tracing::debug!(%err, "using source modification time"),
        }
    }
    let modified = metadata
        .modified()
        .map(OffsetDateTime::from)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    Resolved::Defaulted(modified)
}

/// Parse an octal mode string such as `"755"` or `"0644"`.
pub fn parse_mode(raw: &str) -> Option<u32> {
    u32::from_str_radix(raw.trim(), 8)
        .ok()
        .filter(|mode| *mode <= MAX_MODE)
}
