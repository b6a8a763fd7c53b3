//! # Mosaic Core Kernel Errors
//!
//! [`Error`] is the top-level error for applications built on the core. Each
//! subsystem error converts into it, so front ends can use a single `?`.
use crate::composition::error::CompositionError;
use crate::config::ConfigError;
use crate::plugin_system::error::ModuleLoadError;
use crate::plugin_system::version::VersionError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Resolution, policy or lifecycle failure in the composition engine
    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Module load error: {0}")]
    ModuleLoad(#[from] ModuleLoadError),

    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    #[error("{0}")]
    Other(String),
}

/// Result type for kernel-level operations
pub type Result<T> = std::result::Result<T, Error>;
