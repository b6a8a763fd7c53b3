//! # Mosaic Core Plugin System
//!
//! Discovery and loading of plugin modules.
//!
//! - **[`discovery`]**: [`DirectoryCatalog`], a catalog built by scanning a
//!   discovery root for modules.
//! - **[`loader`]**: The [`ModuleLoader`] seam, the native [`DylibModuleLoader`],
//!   the [`ModuleRegistrar`] handed to modules, and the
//!   [`export_module!`](crate::export_module) macro for module crates.
//! - **[`binary`]**: Header inspection so foreign binaries are skipped before
//!   they are opened.
//! - **[`version`]**: API version gating.
//! - **[`error`]**: [`ModuleLoadError`].
pub mod binary;
pub mod discovery;
pub mod error;
pub mod loader;
pub mod version;

pub use binary::{BinaryFormat, BinaryInfo};
pub use discovery::{DirectoryCatalog, SkippedModule};
pub use error::ModuleLoadError;
pub use loader::{DylibModuleLoader, LoadedModule, ModuleLoader, ModuleRegistrar, resident_modules};
pub use version::{VersionError, VersionRange};

#[cfg(test)]
mod tests;
