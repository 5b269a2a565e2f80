//! Filesystem image (tar archive) builder.
//!
//! Packs the manifest's files and symlinks into a single archive that the
//! kernel unpacks as its root filesystem. Ancestor directories are never
//! declared in the manifest; they are synthesized on demand, shallowest
//! first, and each appears exactly once.
//!
//! # Example
//!
//! ```rust,ignore
//! use infi_image::artifact::fsimage::build_fs_image;
//! use infi_image::{BuildConfig, Manifest};
//! use std::path::Path;
//!
//! let config = BuildConfig::default();
//! let manifest = Manifest::load(Path::new("manifest.toml"))?.resolve(&config)?;
//! build_fs_image(&manifest, &config, Path::new("build/fsimage.tar"))?;
//! ```

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tar::{EntryType, Header, HeaderMode};
use tracing::{debug, info};

use crate::config::BuildConfig;
use crate::error::ImageError;
use crate::manifest::{normalize_archive_path, ResolvedManifest};

const ROOT_OWNER: &str = "root";
const DIR_MODE: u32 = 0o755;
const SYMLINK_MODE: u32 = 0o777;
/// Longest link target that fits the header's link name field.
const MAX_LITERAL_LINK_NAME: usize = 100;

/// Entry counts for a finished archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsImageSummary {
    pub files: usize,
    pub links: usize,
    pub directories: usize,
}

/// Streaming archive writer with implicit directory synthesis.
pub struct FsImageBuilder<W: Write> {
    tar: tar::Builder<W>,
    /// Directories already written to the archive.
    dirs: BTreeSet<String>,
    /// Timestamp stamped on synthesized directories and symlinks.
    mtime: u64,
    summary: FsImageSummary,
}

impl<W: Write> FsImageBuilder<W> {
    pub fn new(writer: W) -> Self {
        let mut tar = tar::Builder::new(writer);
        tar.follow_symlinks(false);
        Self {
            tar,
            dirs: BTreeSet::new(),
            mtime: unix_now(),
            summary: FsImageSummary::default(),
        }
    }

    /// Use a fixed timestamp instead of the current time.
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    /// Make sure `path` and all of its ancestors exist in the archive.
    pub fn ensure_dir(&mut self, path: &str) -> Result<()> {
        self.ensure_normalized_dir(&normalize_archive_path(path))
    }

    /// `path` must already be in canonical form; it is the dedup key and
    /// the name written to the archive.
    fn ensure_normalized_dir(&mut self, path: &str) -> Result<()> {
        if path.is_empty() || self.dirs.contains(path) {
            return Ok(());
        }
        self.ensure_normalized_dir(parent_of(path))?;

        let mut header = root_header(EntryType::Directory, DIR_MODE, self.mtime)?;
        self.tar
            .append_data(&mut header, path, io::empty())
            .with_context(|| format!("writing directory entry '{}'", path))?;
        debug!(path, "directory");

        self.dirs.insert(path.to_string());
        self.summary.directories += 1;
        Ok(())
    }

    /// Add a regular file, copying content and permission bits from `source`.
    pub fn add_file(&mut self, archive_path: &str, source: &Path) -> Result<()> {
        let name = normalize_archive_path(archive_path);
        let name = name.as_str();
        self.ensure_normalized_dir(parent_of(name))?;

        let unreadable = |e: io::Error| ImageError::SourceUnreadable {
            path: source.to_path_buf(),
            source: e,
        };
        let mut file = File::open(source).map_err(unreadable)?;
        let metadata = file.metadata().map_err(unreadable)?;
        if !metadata.is_file() {
            return Err(unreadable(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            ))
            .into());
        }

        let mut header = Header::new_gnu();
        header.set_metadata_in_mode(&metadata, HeaderMode::Complete);
        header.set_entry_type(EntryType::Regular);
        set_root_owner(&mut header)?;

        self.tar
            .append_data(&mut header, name, &mut file)
            .map_err(unreadable)?;
        debug!(path = name, source = %source.display(), "file");

        self.summary.files += 1;
        Ok(())
    }

    /// Add a symbolic link. `target` is written as given.
    pub fn add_symlink(&mut self, archive_path: &str, target: &str) -> Result<()> {
        let name = normalize_archive_path(archive_path);
        let name = name.as_str();
        self.ensure_normalized_dir(parent_of(name))?;

        let mut header = root_header(EntryType::Symlink, SYMLINK_MODE, self.mtime)?;
        if target.len() <= MAX_LITERAL_LINK_NAME {
            header
                .set_link_name_literal(target)
                .with_context(|| format!("invalid link target '{}'", target))?;
            self.tar
                .append_data(&mut header, name, io::empty())
                .with_context(|| format!("writing symlink entry '{}'", name))?;
        } else {
            // Needs the GNU long-link extension.
            self.tar
                .append_link(&mut header, name, target)
                .with_context(|| format!("writing symlink entry '{}'", name))?;
        }
        debug!(path = name, target, "symlink");

        self.summary.links += 1;
        Ok(())
    }

    /// Merge the top-level entries of `dir` into the archive root.
    ///
    /// Hidden names are skipped. Directories are added with their whole
    /// subtree and keep their on-disk metadata. Nothing here goes through
    /// directory synthesis or checks for collisions with manifest paths.
    pub fn add_extra_tree(&mut self, dir: &Path) -> Result<()> {
        let mut children = Vec::new();
        for entry in fs::read_dir(dir)
            .with_context(|| format!("reading extra files directory '{}'", dir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            children.push(name);
        }
        children.sort();

        for name in children {
            let path = dir.join(&name);
            let metadata = fs::symlink_metadata(&path)
                .with_context(|| format!("reading '{}'", path.display()))?;
            let appended = if metadata.is_dir() {
                self.tar.append_dir_all(&name, &path)
            } else {
                self.tar.append_path_with_name(&path, &name)
            };
            appended.with_context(|| format!("adding extra file '{}'", path.display()))?;
            debug!(path = %path.display(), "extra");
        }
        Ok(())
    }

    /// Write the archive trailer and hand back the underlying writer.
    pub fn finish(self) -> Result<(W, FsImageSummary)> {
        let writer = self
            .tar
            .into_inner()
            .context("Failed to finalize tar builder")?;
        Ok((writer, self.summary))
    }
}

/// Build the filesystem image for `manifest` at `output`.
pub fn build_fs_image(
    manifest: &ResolvedManifest,
    config: &BuildConfig,
    output: &Path,
) -> Result<FsImageSummary> {
    build_fs_image_with_mtime(manifest, config, output, unix_now())
}

/// Same as [`build_fs_image`] with a fixed timestamp for synthesized entries.
///
/// The archive is written next to `output` and renamed into place once
/// complete, so a failed build leaves any previous archive untouched.
pub fn build_fs_image_with_mtime(
    manifest: &ResolvedManifest,
    config: &BuildConfig,
    output: &Path,
    mtime: u64,
) -> Result<FsImageSummary> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;

    let partial = tempfile::Builder::new()
        .prefix(".fsimage")
        .suffix(".partial")
        .tempfile_in(parent)
        .with_context(|| format!("creating temporary archive in {}", parent.display()))?;

    let mut builder = FsImageBuilder::new(partial).with_mtime(mtime);

    for file in &manifest.files {
        builder.add_file(&file.archive_path, &file.source_path)?;
    }
    for link in &manifest.links {
        builder.add_symlink(&link.archive_path, &link.link_target)?;
    }
    if let Some(extra) = &config.extra_fsimage {
        if has_entries(extra)? {
            builder.add_extra_tree(extra)?;
        }
    }

    let (partial, summary) = builder.finish()?;
    partial
        .as_file()
        .sync_all()
        .context("flushing filesystem image")?;
    fs::set_permissions(partial.path(), fs::Permissions::from_mode(0o644))?;
    partial
        .persist(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        output = %output.display(),
        files = summary.files,
        links = summary.links,
        directories = summary.directories,
        "filesystem image created"
    );
    Ok(summary)
}

/// Equivalent of `dirname` for archive paths. The root is `""`.
fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => path[..idx].trim_end_matches('/'),
        None => "",
    }
}

fn root_header(kind: EntryType, mode: u32, mtime: u64) -> Result<Header> {
    let mut header = Header::new_gnu();
    header.set_entry_type(kind);
    header.set_size(0);
    header.set_mode(mode);
    header.set_mtime(mtime);
    set_root_owner(&mut header)?;
    Ok(header)
}

fn set_root_owner(header: &mut Header) -> Result<()> {
    header.set_uid(0);
    header.set_gid(0);
    header.set_username(ROOT_OWNER)?;
    header.set_groupname(ROOT_OWNER)?;
    Ok(())
}

fn has_entries(dir: &Path) -> Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("reading extra files directory '{}'", dir.display()))?;
    Ok(entries.next().is_some())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
