//! Build configuration.
//!
//! Every builder receives a [`BuildConfig`] by reference. There is no
//! process-wide settings lookup: the binary loads one from TOML and passes
//! it down, tests construct one directly.
//!
//! ```toml
//! extra_fsimage = "extra"
//! force_video_mode = "800x600"
//! verbose = false
//!
//! [product]
//! name = "Infinity OS"
//! dir = "infi"
//!
//! [features]
//! SHELL = true
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_PRODUCT_NAME: &str = "Infinity OS";
pub const DEFAULT_PRODUCT_DIR: &str = "infi";
pub const DEFAULT_VOLUME_LABEL: &str = "Infi CDROM";
pub const DEFAULT_KERNEL_NAME: &str = "kernel";
pub const DEFAULT_BOOT_TIMEOUT: u32 = 5;
pub const DEFAULT_MASTERING_TOOL: &str = "mkisofs";
pub const DEFAULT_BOOT_LOAD_SIZE: u32 = 4;

/// Resolved settings for one build invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Directory whose top-level entries are merged into the archive root.
    pub extra_fsimage: Option<PathBuf>,
    /// Video mode forced in the boot entry. Empty means none.
    pub force_video_mode: String,
    /// Show the mastering tool's own output.
    pub verbose: bool,
    pub product: ProductConfig,
    pub boot: BootSettings,
    pub mastering: MasteringSettings,
    /// Named flags consulted by conditional manifest entries.
    pub features: BTreeMap<String, bool>,
}

/// Naming of the product on the disc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductConfig {
    /// Boot menu entry title.
    pub name: String,
    /// Top-level directory on the disc holding the kernel and modules.
    pub dir: String,
    pub volume_label: String,
    /// Kernel file name inside the product directory.
    pub kernel: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSettings {
    /// Menu timeout in seconds.
    pub timeout: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasteringSettings {
    pub tool: String,
    /// Number of 512-byte sectors the firmware loads from the boot image.
    pub boot_load_size: u32,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            extra_fsimage: None,
            force_video_mode: String::new(),
            verbose: false,
            product: ProductConfig::default(),
            boot: BootSettings::default(),
            mastering: MasteringSettings::default(),
            features: BTreeMap::new(),
        }
    }
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_PRODUCT_NAME.to_string(),
            dir: DEFAULT_PRODUCT_DIR.to_string(),
            volume_label: DEFAULT_VOLUME_LABEL.to_string(),
            kernel: DEFAULT_KERNEL_NAME.to_string(),
        }
    }
}

impl Default for BootSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_BOOT_TIMEOUT,
        }
    }
}

impl Default for MasteringSettings {
    fn default() -> Self {
        Self {
            tool: DEFAULT_MASTERING_TOOL.to_string(),
            boot_load_size: DEFAULT_BOOT_LOAD_SIZE,
        }
    }
}

impl BuildConfig {
    /// Load a configuration file. Relative `extra_fsimage` paths are
    /// resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading build config '{}'", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&raw, base)
            .with_context(|| format!("parsing build config '{}'", path.display()))
    }

    /// Parse configuration text, resolving relative paths against `base`.
    pub fn from_toml_str(raw: &str, base: &Path) -> Result<Self> {
        let parsed: BuildConfigToml = toml::from_str(raw)?;
        let defaults = BuildConfig::default();

        let extra_fsimage = parsed
            .extra_fsimage
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(|p| base.join(p));

        let product = match parsed.product {
            Some(p) => ProductConfig {
                name: p.name.unwrap_or(defaults.product.name),
                dir: p.dir.unwrap_or(defaults.product.dir),
                volume_label: p.volume_label.unwrap_or(defaults.product.volume_label),
                kernel: p.kernel.unwrap_or(defaults.product.kernel),
            },
            None => defaults.product,
        };
        if product.dir.is_empty() || product.dir.contains('/') {
            bail!(
                "invalid product.dir '{}': expected a single path component",
                product.dir
            );
        }

        let boot = BootSettings {
            timeout: parsed
                .boot
                .and_then(|b| b.timeout)
                .unwrap_or(defaults.boot.timeout),
        };

        let mastering = match parsed.mastering {
            Some(m) => MasteringSettings {
                tool: m.tool.unwrap_or(defaults.mastering.tool),
                boot_load_size: m.boot_load_size.unwrap_or(defaults.mastering.boot_load_size),
            },
            None => defaults.mastering,
        };

        Ok(Self {
            extra_fsimage,
            force_video_mode: parsed.force_video_mode.unwrap_or_default().trim().to_string(),
            verbose: parsed.verbose.unwrap_or(false),
            product,
            boot,
            mastering,
            features: parsed.features.unwrap_or_default(),
        })
    }

    /// The forced video mode, if one is configured.
    pub fn video_mode(&self) -> Option<&str> {
        if self.force_video_mode.is_empty() {
            None
        } else {
            Some(&self.force_video_mode)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildConfigToml {
    extra_fsimage: Option<String>,
    force_video_mode: Option<String>,
    verbose: Option<bool>,
    product: Option<ProductToml>,
    boot: Option<BootToml>,
    mastering: Option<MasteringToml>,
    features: Option<BTreeMap<String, bool>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProductToml {
    name: Option<String>,
    dir: Option<String>,
    volume_label: Option<String>,
    kernel: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BootToml {
    timeout: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MasteringToml {
    tool: Option<String>,
    boot_load_size: Option<u32>,
}
