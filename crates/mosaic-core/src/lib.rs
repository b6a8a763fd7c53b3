// Top-level modules of the composition host
pub mod composition;
pub mod config;
pub mod kernel;
pub mod plugin_system;
pub mod utils;

// Re-export key public types/traits for easier use by the binary and plugin modules
pub use composition::{
    Catalog, CompositionContainer, CompositionError, CompositionHost, CompositionRegistry,
    CompositionSet, CompositionSetLock, CreationPolicy, PartBuilder, PartDefinition,
};
pub use config::CompositionConfig;
pub use kernel::error::Error as KernelError;
pub use plugin_system::{DirectoryCatalog, ModuleLoader, ModuleRegistrar};
