//! # Mosaic Core Plugin System Errors
//!
//! [`ModuleLoadError`] covers every way a candidate module can be rejected:
//! wrong binary format or architecture, missing entry symbols, an API version
//! outside the accepted range, or a failing or panicking registration. Module
//! failures are never fatal to discovery; the module is skipped and the error
//! kept as a diagnostic.
use std::path::{Path, PathBuf};

use crate::plugin_system::binary::BinaryFormat;

#[derive(Debug, thiserror::Error)]
pub enum ModuleLoadError {
    #[error("'{}' is not a recognizable module binary", path.display())]
    NotABinary { path: PathBuf },

    #[error("'{}' is a {found} binary but this platform loads {expected} modules", path.display())]
    ForeignFormat {
        path: PathBuf,
        found: BinaryFormat,
        expected: BinaryFormat,
    },

    #[error("'{}' targets {found} but this process runs on {expected}", path.display())]
    ArchitectureMismatch {
        path: PathBuf,
        found: String,
        expected: &'static str,
    },

    #[error("Failed to open module '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("Module '{}' does not export '{symbol}': {source}", path.display())]
    MissingSymbol {
        path: PathBuf,
        symbol: String,
        #[source]
        source: libloading::Error,
    },

    #[error("Module '{}' was built against API '{found}', which does not satisfy '{required}'", path.display())]
    ApiVersion {
        path: PathBuf,
        found: String,
        required: String,
    },

    #[error("Module '{}' failed to register its parts: {message}", path.display())]
    Registration { path: PathBuf, message: String },

    #[error("Module '{}' panicked during registration: {message}", path.display())]
    Panicked { path: PathBuf, message: String },

    #[error("I/O error reading module '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ModuleLoadError {
    /// The module file the error is about.
    pub fn path(&self) -> &Path {
        match self {
            ModuleLoadError::NotABinary { path }
            | ModuleLoadError::ForeignFormat { path, .. }
            | ModuleLoadError::ArchitectureMismatch { path, .. }
            | ModuleLoadError::Open { path, .. }
            | ModuleLoadError::MissingSymbol { path, .. }
            | ModuleLoadError::ApiVersion { path, .. }
            | ModuleLoadError::Registration { path, .. }
            | ModuleLoadError::Panicked { path, .. }
            | ModuleLoadError::Io { path, .. } => path,
        }
    }
}
