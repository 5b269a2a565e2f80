//! Filesystem archive and bootable disc assembly for Infinity OS.
//!
//! Turns already compiled build outputs into the two artifacts a boot needs:
//!
//! - **Filesystem image** - a tar archive of the root filesystem, built from
//!   a [`Manifest`] of files and symlinks
//! - **ISO image** - a bootable disc holding the boot sector, the stage-2
//!   loader, its configuration and the filesystem image as a module
//!
//! # Architecture
//!
//! ```text
//! manifest.toml ──► Manifest ──resolve(BuildConfig)──► ResolvedManifest
//!                                                          │
//!                                          artifact::fsimage
//!                                                          │
//!                                                    fsimage.tar
//!                                                          │
//! cdboot.bin + loader.bin ───────────► artifact::staging (tmp tree)
//!                                                          │
//!                                          artifact::iso (DiscMaster)
//!                                                          │
//!                                                       infi.iso
//! ```
//!
//! The [`emitter`] module reports each step's full input set to the outer
//! build graph.

pub mod artifact;
pub mod config;
pub mod emitter;
pub mod error;
pub mod manifest;
pub mod preflight;
pub mod process;

pub use config::BuildConfig;
pub use error::ImageError;
pub use manifest::{Manifest, ManifestEntry, ResolvedManifest};
