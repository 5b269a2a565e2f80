//! Bootable ISO image builder.
//!
//! Masters a staging tree into an ISO-9660 image with Joliet and Rock Ridge
//! extensions and a no-emulation El Torito boot entry for `boot/cdboot.img`.
//! The mastering tool is reached through [`DiscMaster`] so builds can be
//! exercised without it installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use infi_image::artifact::iso::{build_iso, MkisofsMaster};
//! use infi_image::artifact::staging::BootInputs;
//! use infi_image::BuildConfig;
//! use std::path::Path;
//!
//! let config = BuildConfig::default();
//! let inputs = BootInputs {
//!     cdboot: "build/cdboot.bin".into(),
//!     loader: "build/loader.bin".into(),
//!     fsimage: "build/fsimage.tar".into(),
//! };
//! let master = MkisofsMaster::new(&config.mastering.tool);
//! build_iso(&config, &inputs, Path::new("build/infi.iso"), &master)?;
//! ```

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tracing::info;

use crate::artifact::staging::{self, BootInputs, StagingTree, BOOT_IMAGE};
use crate::config::BuildConfig;
use crate::error::ImageError;
use crate::process::Cmd;

/// Something that can turn a directory into a disc image.
pub trait DiscMaster {
    /// Tool name used in error messages.
    fn tool(&self) -> &str;

    /// Run the tool with `args` to completion.
    ///
    /// `Err` means the tool could not be started at all.
    fn invoke(&self, args: &[OsString], verbose: bool) -> Result<ExitStatus>;
}

/// Runs an `mkisofs`-compatible tool on the host.
#[derive(Debug, Clone)]
pub struct MkisofsMaster {
    program: String,
}

impl MkisofsMaster {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DiscMaster for MkisofsMaster {
    fn tool(&self) -> &str {
        &self.program
    }

    fn invoke(&self, args: &[OsString], verbose: bool) -> Result<ExitStatus> {
        Cmd::new(&self.program).args(args).quiet(!verbose).status()
    }
}

/// Command line for mastering `staging` into `output`.
pub fn mastering_args(config: &BuildConfig, staging: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-J",
        "-R",
        "-l",
        "-b",
        BOOT_IMAGE,
        "-V",
        config.product.volume_label.as_str(),
        "-boot-load-size",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(config.mastering.boot_load_size.to_string().into());
    args.extend(
        ["-boot-info-table", "-no-emul-boot", "-o"]
            .iter()
            .map(OsString::from),
    );
    args.push(output.as_os_str().to_os_string());
    args.push(staging.as_os_str().to_os_string());
    args
}

/// Master an already populated staging tree into `output`.
///
/// The image is written to a sibling `.partial` file and renamed over
/// `output` only on success. The staging tree is removed on every path.
pub fn master_staging_tree(
    config: &BuildConfig,
    tree: StagingTree,
    output: &Path,
    master: &dyn DiscMaster,
) -> Result<()> {
    let partial = partial_path(output);
    let result = run_master(config, tree.path(), &partial, master);
    tree.discard();

    match result {
        Ok(()) => fs::rename(&partial, output).with_context(|| {
            format!(
                "Failed to move {} to {}",
                partial.display(),
                output.display()
            )
        }),
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(e)
        }
    }
}

/// Assemble a staging tree for `inputs` and master it into `output`.
pub fn build_iso(
    config: &BuildConfig,
    inputs: &BootInputs,
    output: &Path,
    master: &dyn DiscMaster,
) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    let tree = staging::assemble(config, inputs)?;
    master_staging_tree(config, tree, output, master)?;

    let size = fs::metadata(output)?.len();
    info!(output = %output.display(), size_kib = size / 1024, "ISO created");
    Ok(())
}

fn run_master(
    config: &BuildConfig,
    staging: &Path,
    output: &Path,
    master: &dyn DiscMaster,
) -> Result<()> {
    let args = mastering_args(config, staging, output);
    let status = master
        .invoke(&args, config.verbose)
        .map_err(|e| ImageError::Mastering {
            tool: master.tool().to_string(),
            detail: format!("{:#}", e),
        })?;

    if !status.success() {
        return Err(ImageError::Mastering {
            tool: master.tool().to_string(),
            detail: match status.code() {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            },
        }
        .into());
    }
    Ok(())
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("image.iso"));
    name.push(".partial");
    output.with_file_name(name)
}
