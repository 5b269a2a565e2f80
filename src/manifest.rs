//! Filesystem image manifest.
//!
//! A manifest declares which build outputs land where in the target root
//! filesystem. It is written by the outer build description and resolved
//! against a [`BuildConfig`] exactly once, before any builder runs:
//!
//! ```toml
//! [[file]]
//! path = "/system/bin/shell"
//! source = "build/shell"
//! feature = "SHELL"        # only included when SHELL = true
//!
//! [[link]]
//! path = "/bin"
//! target = "system/bin"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::config::BuildConfig;
use crate::error::ImageError;

/// A declared regular file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEntry {
    /// Always included.
    File {
        archive_path: String,
        source_path: PathBuf,
    },
    /// Included only when `flag` is enabled in the configuration.
    Conditional {
        flag: String,
        archive_path: String,
        source_path: PathBuf,
    },
}

/// A declared symbolic link. The target is stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    pub archive_path: String,
    pub link_target: String,
}

/// A regular file that survived feature resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub archive_path: String,
    pub source_path: PathBuf,
}

/// Manifest as declared, before feature flags are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub files: Vec<ManifestEntry>,
    pub links: Vec<LinkEntry>,
}

/// Manifest with every conditional entry decided.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedManifest {
    pub files: Vec<FileEntry>,
    pub links: Vec<LinkEntry>,
}

impl Manifest {
    /// Load a manifest file. Relative source paths are resolved against the
    /// manifest's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading manifest '{}'", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&raw, base)
            .with_context(|| format!("parsing manifest '{}'", path.display()))
    }

    pub fn from_toml_str(raw: &str, base: &Path) -> Result<Self> {
        let parsed: ManifestToml = toml::from_str(raw)?;

        let files = parsed
            .file
            .into_iter()
            .map(|f| {
                let source_path = base.join(f.source);
                match f.feature {
                    Some(flag) => ManifestEntry::Conditional {
                        flag,
                        archive_path: f.path,
                        source_path,
                    },
                    None => ManifestEntry::File {
                        archive_path: f.path,
                        source_path,
                    },
                }
            })
            .collect();

        let links = parsed
            .link
            .into_iter()
            .map(|l| LinkEntry {
                archive_path: l.path,
                link_target: l.target,
            })
            .collect();

        Ok(Self { files, links })
    }

    /// Apply the configuration's feature flags.
    ///
    /// Fails with [`ImageError::UnknownFeature`] when an entry names a flag
    /// the configuration does not define.
    pub fn resolve(&self, config: &BuildConfig) -> Result<ResolvedManifest> {
        let mut files = Vec::with_capacity(self.files.len());

        for entry in &self.files {
            match entry {
                ManifestEntry::File {
                    archive_path,
                    source_path,
                } => files.push(FileEntry {
                    archive_path: archive_path.clone(),
                    source_path: source_path.clone(),
                }),
                ManifestEntry::Conditional {
                    flag,
                    archive_path,
                    source_path,
                } => {
                    let enabled = config
                        .features
                        .get(flag)
                        .copied()
                        .ok_or_else(|| ImageError::UnknownFeature { flag: flag.clone() })?;
                    if enabled {
                        files.push(FileEntry {
                            archive_path: archive_path.clone(),
                            source_path: source_path.clone(),
                        });
                    }
                }
            }
        }

        Ok(ResolvedManifest {
            files,
            links: self.links.clone(),
        })
    }
}

/// Rewrite `path` relative to the archive root in canonical form.
///
/// Leading separators, `.` components and repeated separators are dropped,
/// so every spelling of a directory maps to the same archive name.
pub fn normalize_archive_path(path: &str) -> String {
    Path::new(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestToml {
    #[serde(default)]
    file: Vec<FileToml>,
    #[serde(default)]
    link: Vec<LinkToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileToml {
    path: String,
    source: String,
    feature: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LinkToml {
    path: String,
    target: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[file]]
path = "/etc/init"
source = "build/init"

[[file]]
path = "/system/bin/shell"
source = "build/shell"
feature = "SHELL"

[[link]]
path = "/bin"
target = "system/bin"
"#;

    #[test]
    fn test_normalize_strips_all_leading_separators() {
        assert_eq!(normalize_archive_path("/etc/init"), "etc/init");
        assert_eq!(normalize_archive_path("///etc/init"), "etc/init");
        assert_eq!(normalize_archive_path("etc/init"), "etc/init");
        assert_eq!(normalize_archive_path("/"), "");
    }

    #[test]
    fn test_normalize_collapses_equivalent_spellings() {
        assert_eq!(normalize_archive_path("/a//b/c"), "a/b/c");
        assert_eq!(normalize_archive_path("/./etc/init"), "etc/init");
        assert_eq!(normalize_archive_path("etc/./rc/"), "etc/rc");
    }

    #[test]
    fn test_parse_entries_in_order() {
        let manifest = Manifest::from_toml_str(SAMPLE, Path::new("/src")).unwrap();

        assert_eq!(
            manifest.files,
            vec![
                ManifestEntry::File {
                    archive_path: "/etc/init".into(),
                    source_path: PathBuf::from("/src/build/init"),
                },
                ManifestEntry::Conditional {
                    flag: "SHELL".into(),
                    archive_path: "/system/bin/shell".into(),
                    source_path: PathBuf::from("/src/build/shell"),
                },
            ]
        );
        assert_eq!(
            manifest.links,
            vec![LinkEntry {
                archive_path: "/bin".into(),
                link_target: "system/bin".into(),
            }]
        );
    }

    #[test]
    fn test_resolve_applies_feature_flags() {
        let manifest = Manifest::from_toml_str(SAMPLE, Path::new("/src")).unwrap();

        let mut config = BuildConfig::default();
        config.features.insert("SHELL".into(), false);
        let resolved = manifest.resolve(&config).unwrap();
        assert_eq!(resolved.files.len(), 1);
        assert_eq!(resolved.files[0].archive_path, "/etc/init");

        config.features.insert("SHELL".into(), true);
        let resolved = manifest.resolve(&config).unwrap();
        assert_eq!(resolved.files.len(), 2);
        assert_eq!(resolved.files[1].source_path, PathBuf::from("/src/build/shell"));
        assert_eq!(resolved.links.len(), 1);
    }

    #[test]
    fn test_resolve_unknown_feature_fails() {
        let manifest = Manifest::from_toml_str(SAMPLE, Path::new("/src")).unwrap();
        let err = manifest.resolve(&BuildConfig::default()).unwrap_err();

        match err.downcast_ref::<ImageError>() {
            Some(ImageError::UnknownFeature { flag }) => assert_eq!(flag, "SHELL"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = Manifest::from_toml_str("", Path::new("/")).unwrap();
        assert_eq!(manifest, Manifest::default());
    }
}
