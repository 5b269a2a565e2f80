//! Classified build failures.
//!
//! Most code paths return `anyhow::Result` with context attached. The
//! failures a caller may want to tell apart are raised as [`ImageError`]
//! and can be recovered with `err.downcast_ref::<ImageError>()`.

use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort an image build step.
#[derive(Debug, Error)]
pub enum ImageError {
    /// A manifest source artifact could not be opened or read.
    #[error("cannot read source artifact '{}': {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The disc-mastering tool is missing or exited unsuccessfully.
    #[error("Could not run {tool}: {detail}. Please ensure that it is installed.")]
    Mastering { tool: String, detail: String },

    /// A conditional manifest entry names a feature the configuration lacks.
    #[error("manifest references unknown feature '{flag}'")]
    UnknownFeature { flag: String },
}
