//! Preflight checks for build validation.
//!
//! Validates that the host system has required tools before building.
//! This turns a missing mastering tool into a clear message up front
//! instead of a failed step after the staging tree has been assembled.
//!
//! # Example
//!
//! ```rust
//! use infi_image::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("mkisofs") {
//!     println!("cdrtools not installed");
//! }
//!
//! let tools = &[("mkisofs", "cdrtools or genisoimage")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Result};

use crate::config::BuildConfig;

/// Check if a command exists in PATH.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Package hint for known mastering tools.
pub fn package_for(tool: &str) -> &'static str {
    match tool {
        "mkisofs" => "cdrtools or genisoimage",
        "genisoimage" => "genisoimage",
        "xorrisofs" | "xorriso" => "xorriso",
        _ => "the disc-mastering tool",
    }
}

/// Check that specific tools are available.
///
/// # Arguments
///
/// * `tools` - Slice of (command, package) tuples
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` with list of missing tools and their packages
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<_> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .collect();

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Check the tools an ISO build needs under `config`.
pub fn check_iso_tools(config: &BuildConfig) -> Result<()> {
    let tool = config.mastering.tool.as_str();
    check_required_tools(&[(tool, package_for(tool))])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        // 'sh' should exist on any Unix system
        assert!(command_exists("sh"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_check_required_tools_success() {
        let tools = &[("sh", "coreutils"), ("cat", "coreutils")];
        assert!(check_required_tools(tools).is_ok());
    }

    #[test]
    fn test_check_required_tools_lists_missing() {
        let tools = &[
            ("sh", "coreutils"),
            ("nonexistent_command_xyz", "fake-package"),
        ];
        let err = check_required_tools(tools).unwrap_err().to_string();
        assert!(err.contains("nonexistent_command_xyz (install: fake-package)"));
        assert!(!err.contains("coreutils"));
    }

    #[test]
    fn test_check_iso_tools_uses_configured_tool() {
        let mut config = BuildConfig::default();
        config.mastering.tool = "nonexistent_mastering_tool".into();
        let err = check_iso_tools(&config).unwrap_err().to_string();
        assert!(err.contains("nonexistent_mastering_tool"));
    }
}
