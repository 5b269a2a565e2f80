//! Build-graph dependency emitters.
//!
//! The outer build graph only sees the explicit sources of a step. Each
//! emitter widens that list to everything the builder actually reads, so a
//! change to any of those inputs invalidates the artifact.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::BuildConfig;
use crate::manifest::ResolvedManifest;

/// Declares the complete dependency set of a build step.
pub trait Emitter {
    fn emit(&self, targets: Vec<PathBuf>, sources: Vec<PathBuf>)
        -> Result<(Vec<PathBuf>, Vec<PathBuf>)>;
}

/// Dependencies of the filesystem image: every manifest source plus the
/// contents of the extra-files directory.
pub struct FsImageEmitter<'a> {
    pub manifest: &'a ResolvedManifest,
    pub config: &'a BuildConfig,
}

impl Emitter for FsImageEmitter<'_> {
    fn emit(
        &self,
        targets: Vec<PathBuf>,
        mut sources: Vec<PathBuf>,
    ) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        sources.extend(self.manifest.files.iter().map(|f| f.source_path.clone()));
        if let Some(extra) = &self.config.extra_fsimage {
            sources.extend(extra_files(extra)?);
        }
        Ok((targets, sources))
    }
}

/// Dependencies of the ISO image: loader, boot sector, then the archive.
pub struct DiscImageEmitter<'a> {
    pub cdboot: &'a Path,
    pub loader: &'a Path,
}

impl Emitter for DiscImageEmitter<'_> {
    fn emit(
        &self,
        targets: Vec<PathBuf>,
        sources: Vec<PathBuf>,
    ) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        if sources.len() != 1 {
            bail!(
                "ISO image takes exactly one source (the filesystem image), got {}",
                sources.len()
            );
        }
        let mut deps = vec![self.loader.to_path_buf(), self.cdboot.to_path_buf()];
        deps.extend(sources);
        Ok((targets, deps))
    }
}

/// Files under the extra-files directory that end up in the archive.
fn extra_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() != 1 || !e.file_name().to_string_lossy().starts_with('.'));

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
        if !entry.file_type().is_dir() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Write a Make-style depfile: `target: dep dep ...`.
pub fn write_depfile(target: &Path, deps: &[PathBuf], path: &Path) -> Result<()> {
    fs::write(path, render_depfile(target, deps))
        .with_context(|| format!("Failed to write depfile {}", path.display()))
}

pub fn render_depfile(target: &Path, deps: &[PathBuf]) -> String {
    let mut out = escape(target);
    out.push(':');
    for dep in deps {
        out.push_str(" \\\n  ");
        out.push_str(&escape(dep));
    }
    out.push('\n');
    out
}

fn escape(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace(' ', "\\ ")
        .replace('#', "\\#")
        .replace('$', "$$")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{FileEntry, LinkEntry};
    use tempfile::TempDir;

    fn manifest() -> ResolvedManifest {
        ResolvedManifest {
            files: vec![
                FileEntry {
                    archive_path: "/etc/init".into(),
                    source_path: "build/init".into(),
                },
                FileEntry {
                    archive_path: "/bin/shell".into(),
                    source_path: "build/shell".into(),
                },
            ],
            links: vec![LinkEntry {
                archive_path: "/sbin".into(),
                link_target: "bin".into(),
            }],
        }
    }

    #[test]
    fn test_fs_image_depends_on_every_source() {
        let manifest = manifest();
        let config = BuildConfig::default();
        let emitter = FsImageEmitter {
            manifest: &manifest,
            config: &config,
        };

        let (targets, sources) = emitter
            .emit(vec!["fsimage.tar".into()], vec!["manifest.toml".into()])
            .unwrap();
        assert_eq!(targets, vec![PathBuf::from("fsimage.tar")]);
        assert_eq!(
            sources,
            vec![
                PathBuf::from("manifest.toml"),
                PathBuf::from("build/init"),
                PathBuf::from("build/shell"),
            ]
        );
    }

    #[test]
    fn test_fs_image_includes_extra_files() {
        let temp = TempDir::new().unwrap();
        let extra = temp.path().join("extra");
        fs::create_dir_all(extra.join("data")).unwrap();
        fs::create_dir_all(extra.join(".git")).unwrap();
        fs::write(extra.join("data/a"), "a").unwrap();
        fs::write(extra.join("motd"), "m").unwrap();
        fs::write(extra.join(".git/HEAD"), "x").unwrap();

        let manifest = ResolvedManifest::default();
        let config = BuildConfig {
            extra_fsimage: Some(extra.clone()),
            ..BuildConfig::default()
        };
        let emitter = FsImageEmitter {
            manifest: &manifest,
            config: &config,
        };

        let (_, sources) = emitter.emit(vec![], vec![]).unwrap();
        assert_eq!(sources, vec![extra.join("data/a"), extra.join("motd")]);
    }

    #[test]
    fn test_disc_image_dependencies() {
        let emitter = DiscImageEmitter {
            cdboot: Path::new("build/cdboot.bin"),
            loader: Path::new("build/loader.bin"),
        };
        let (_, sources) = emitter
            .emit(vec!["infi.iso".into()], vec!["fsimage.tar".into()])
            .unwrap();
        assert_eq!(
            sources,
            vec![
                PathBuf::from("build/loader.bin"),
                PathBuf::from("build/cdboot.bin"),
                PathBuf::from("fsimage.tar"),
            ]
        );
    }

    #[test]
    fn test_disc_image_requires_single_source() {
        let emitter = DiscImageEmitter {
            cdboot: Path::new("c"),
            loader: Path::new("l"),
        };
        assert!(emitter.emit(vec![], vec![]).is_err());
        assert!(emitter
            .emit(vec![], vec!["a".into(), "b".into()])
            .is_err());
    }

    #[test]
    fn test_render_depfile_escapes() {
        let out = render_depfile(
            Path::new("out/infi.iso"),
            &["my dir/loader.bin".into(), "fsimage.tar".into()],
        );
        assert_eq!(
            out,
            "out/infi.iso: \\\n  my\\ dir/loader.bin \\\n  fsimage.tar\n"
        );
    }
}
