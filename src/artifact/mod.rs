//! Artifact builders for disc images.
//!
//! This module provides the builders a disc build runs in order:
//! - [`fsimage`] - Root filesystem tar archive from a manifest
//! - [`bootcfg`] - Boot loader configuration text
//! - [`staging`] - Staging tree (boot sector + loader, config, modules)
//! - [`iso`] - ISO mastering through an external tool
//!
//! # Usage
//!
//! ```rust,ignore
//! use infi_image::artifact::{fsimage, iso};
//!
//! fsimage::build_fs_image(&manifest, &config, &fsimage_path)?;
//! iso::build_iso(&config, &inputs, &iso_path, &master)?;
//! ```

pub mod bootcfg;
pub mod fsimage;
pub mod iso;
pub mod staging;
