//! Disc staging tree.
//!
//! The staging tree is the directory handed to the mastering tool:
//!
//! ```text
//! <tmp>.infiiso/
//! ├── boot/
//! │   ├── cdboot.img      boot sector immediately followed by the loader
//! │   └── loader.cfg
//! └── infi/
//!     └── modules/
//!         └── fsimage.tar
//! ```
//!
//! Each build gets its own uniquely named temporary directory. It is removed
//! when the [`StagingTree`] is dropped, whichever way the build ends.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::artifact::bootcfg::BootConfig;
use crate::config::BuildConfig;

pub const BOOT_DIR: &str = "boot";
pub const BOOT_IMAGE: &str = "boot/cdboot.img";
pub const LOADER_CONFIG: &str = "boot/loader.cfg";
pub const MODULES_DIR: &str = "modules";
const STAGING_SUFFIX: &str = ".infiiso";

/// Binaries that go into the staging tree.
#[derive(Debug, Clone)]
pub struct BootInputs {
    /// Stage-1 CD boot sector.
    pub cdboot: PathBuf,
    /// Stage-2 loader.
    pub loader: PathBuf,
    /// Filesystem image placed in the modules directory.
    pub fsimage: PathBuf,
}

/// An on-disk staging directory owned by one build.
#[derive(Debug)]
pub struct StagingTree {
    dir: TempDir,
    product_dir: String,
}

impl StagingTree {
    /// Create an empty tree with `boot/` and `<product>/modules/`.
    pub fn create(config: &BuildConfig) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .suffix(STAGING_SUFFIX)
            .tempdir()
            .context("creating staging directory")?;
        let tree = Self {
            dir,
            product_dir: config.product.dir.clone(),
        };

        fs::create_dir_all(tree.boot_dir())
            .with_context(|| format!("Failed to create {}", tree.boot_dir().display()))?;
        fs::create_dir_all(tree.modules_dir())
            .with_context(|| format!("Failed to create {}", tree.modules_dir().display()))?;
        debug!(path = %tree.path().display(), "staging tree created");

        Ok(tree)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn boot_dir(&self) -> PathBuf {
        self.path().join(BOOT_DIR)
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.path().join(&self.product_dir).join(MODULES_DIR)
    }

    /// Copy a module file into the modules directory, keeping its name.
    pub fn add_module(&self, module: &Path) -> Result<PathBuf> {
        let name = module
            .file_name()
            .with_context(|| format!("module path has no file name: {}", module.display()))?;
        let dest = self.modules_dir().join(name);
        fs::copy(module, &dest)
            .with_context(|| format!("Failed to copy module: {}", module.display()))?;
        Ok(dest)
    }

    pub fn write_boot_config(&self, boot_config: &BootConfig) -> Result<PathBuf> {
        let dest = self.path().join(LOADER_CONFIG);
        fs::write(&dest, boot_config.render())
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        Ok(dest)
    }

    /// Write `boot/cdboot.img` as the boot sector followed by the loader.
    pub fn write_boot_image(&self, cdboot: &Path, loader: &Path) -> Result<PathBuf> {
        let dest = self.path().join(BOOT_IMAGE);
        concat_files(&[cdboot, loader], &dest)?;
        Ok(dest)
    }

    /// Remove the tree now and report any failure.
    pub fn close(self) -> Result<()> {
        let path = self.path().to_path_buf();
        self.dir
            .close()
            .with_context(|| format!("Failed to remove staging directory {}", path.display()))
    }

    /// Remove the tree, logging instead of failing.
    pub fn discard(self) {
        let path = self.path().to_path_buf();
        if let Err(e) = self.close() {
            warn!(path = %path.display(), error = %e, "staging cleanup failed");
        }
    }
}

/// Lay out a complete staging tree for `inputs`.
pub fn assemble(config: &BuildConfig, inputs: &BootInputs) -> Result<StagingTree> {
    let tree = StagingTree::create(config)?;
    tree.add_module(&inputs.fsimage)?;
    tree.write_boot_config(&BootConfig::from_build_config(config))?;
    tree.write_boot_image(&inputs.cdboot, &inputs.loader)?;
    Ok(tree)
}

/// Byte-for-byte concatenation of `parts` into `dest`.
pub fn concat_files(parts: &[&Path], dest: &Path) -> Result<u64> {
    let mut out =
        File::create(dest).with_context(|| format!("Failed to create {}", dest.display()))?;
    let mut total = 0;
    for part in parts {
        let mut input =
            File::open(part).with_context(|| format!("Failed to open {}", part.display()))?;
        total += io::copy(&mut input, &mut out).with_context(|| {
            format!("Failed to append {} to {}", part.display(), dest.display())
        })?;
    }
    out.sync_all()?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_inputs(dir: &Path, boot: &[u8], loader: &[u8]) -> BootInputs {
        let inputs = BootInputs {
            cdboot: dir.join("cdboot.bin"),
            loader: dir.join("loader.bin"),
            fsimage: dir.join("fsimage.tar"),
        };
        fs::write(&inputs.cdboot, boot).unwrap();
        fs::write(&inputs.loader, loader).unwrap();
        fs::write(&inputs.fsimage, b"archive").unwrap();
        inputs
    }

    #[test]
    fn test_boot_image_is_exact_concatenation() {
        let temp = TempDir::new().unwrap();
        let boot: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
        let loader: Vec<u8> = (0..777u32).map(|i| (i % 13) as u8 ^ 0xAA).collect();
        let inputs = write_inputs(temp.path(), &boot, &loader);

        let tree = assemble(&BuildConfig::default(), &inputs).unwrap();
        let image = fs::read(tree.path().join(BOOT_IMAGE)).unwrap();

        assert_eq!(image.len(), boot.len() + loader.len());
        assert_eq!(&image[..boot.len()], boot.as_slice());
        assert_eq!(&image[boot.len()..], loader.as_slice());
    }

    #[test]
    fn test_layout() {
        let temp = TempDir::new().unwrap();
        let inputs = write_inputs(temp.path(), b"B", b"L");

        let tree = assemble(&BuildConfig::default(), &inputs).unwrap();
        let root = tree.path();

        assert!(root.file_name().unwrap().to_string_lossy().ends_with(".infiiso"));
        assert!(root.join("boot").is_dir());
        assert_eq!(
            fs::read(root.join("infi/modules/fsimage.tar")).unwrap(),
            b"archive"
        );
        let cfg = fs::read_to_string(root.join(LOADER_CONFIG)).unwrap();
        assert!(cfg.contains("laos \"/infi/kernel\" \"/infi/modules\""));
    }

    #[test]
    fn test_drop_removes_tree() {
        let temp = TempDir::new().unwrap();
        let inputs = write_inputs(temp.path(), b"B", b"L");

        let tree = assemble(&BuildConfig::default(), &inputs).unwrap();
        let path = tree.path().to_path_buf();
        assert!(path.exists());
        drop(tree);
        assert!(!path.exists());
    }

    #[test]
    fn test_close_removes_tree() {
        let tree = StagingTree::create(&BuildConfig::default()).unwrap();
        let path = tree.path().to_path_buf();
        tree.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_loader_fails() {
        let temp = TempDir::new().unwrap();
        let mut inputs = write_inputs(temp.path(), b"B", b"L");
        inputs.loader = temp.path().join("missing.bin");

        let err = assemble(&BuildConfig::default(), &inputs).unwrap_err();
        assert!(err.to_string().contains("missing.bin"));
    }

    #[test]
    fn test_concat_empty_parts() {
        let temp = TempDir::new().unwrap();
        let empty = temp.path().join("empty");
        fs::write(&empty, b"").unwrap();
        let dest = temp.path().join("out");

        assert_eq!(concat_files(&[&empty, &empty], &dest).unwrap(), 0);
        assert_eq!(fs::read(&dest).unwrap().len(), 0);
    }
}
