//! Boot loader configuration (`boot/loader.cfg`).
//!
//! The loader reads a small line-oriented script:
//!
//! ```text
//! set "timeout" 5
//! entry "Infinity OS" {
//!    set "video_mode" "800x600"
//!    laos "/infi/kernel" "/infi/modules"
//! }
//! ```

use std::fmt::{self, Write as _};

use crate::config::BuildConfig;

/// One menu entry booting a kernel with a modules directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootEntry {
    pub name: String,
    pub kernel: String,
    pub modules: String,
    pub video_mode: Option<String>,
}

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootConfig {
    pub timeout: u32,
    pub entries: Vec<BootEntry>,
}

impl BootConfig {
    /// The single product entry described by `config`.
    pub fn from_build_config(config: &BuildConfig) -> Self {
        let dir = &config.product.dir;
        Self {
            timeout: config.boot.timeout,
            entries: vec![BootEntry {
                name: config.product.name.clone(),
                kernel: format!("/{}/{}", dir, config.product.kernel),
                modules: format!("/{}/modules", dir),
                video_mode: config.video_mode().map(str::to_string),
            }],
        }
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BootConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "set \"timeout\" {}", self.timeout)?;
        for entry in &self.entries {
            let mut body = String::new();
            if let Some(mode) = &entry.video_mode {
                writeln!(body, "   set \"video_mode\" \"{}\"", mode)?;
            }
            writeln!(body, "   laos \"{}\" \"{}\"", entry.kernel, entry.modules)?;
            write!(f, "entry \"{}\" {{\n{}}}\n", entry.name, body)?;
        }
        Ok(())
    }
}
