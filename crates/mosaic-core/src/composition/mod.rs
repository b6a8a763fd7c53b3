//! # Mosaic Core Composition
//!
//! The composition engine: parts declare what they export and import, catalogs
//! collect parts, containers resolve imports against exports, and sets and
//! hosts manage who shares which container for how long.
//!
//! ## Key Submodules and Responsibilities:
//!
//! - **[`part`]**: Part descriptors ([`PartDefinition`]) and the builder used to
//!   declare them ([`PartBuilder`]), contracts, imports and creation policies.
//! - **[`metadata`]**: Export metadata and typed metadata views.
//! - **[`catalog`]**: The [`Catalog`] trait and the type, aggregate and
//!   filtered catalogs.
//! - **[`container`]**: The resolution engine ([`CompositionContainer`]) and
//!   lazy export handles.
//! - **[`validation`]**: Creation-policy checks for the host getters.
//! - **[`set`]**: Reference-counted per-root state ([`CompositionSet`]).
//! - **[`host`]**: The consumer façade ([`CompositionHost`]).
//! - **[`host_manager`]**: Tracking of live hosts.
//! - **[`registry`]**: The application-owned registry tying it all together
//!   ([`CompositionRegistry`]).
//! - **[`error`]**: [`CompositionError`] and [`ResolutionFailure`].
pub mod catalog;
pub mod container;
pub mod error;
pub mod host;
pub mod host_manager;
pub mod metadata;
pub mod part;
pub mod registry;
pub mod set;
pub mod validation;

pub use catalog::{AggregateCatalog, Catalog, CompositionFilter, FilteredCatalog, TypeCatalog};
pub use container::{
    ComposablePart, CompositionBatch, CompositionContainer, ContainerId, Export, Imports, Lazy,
    Lookup,
};
pub use error::{CompositionError, ResolutionFailure, Result};
pub use host::{CompositionHost, HostId};
pub use host_manager::HostManager;
pub use metadata::{Metadata, MetadataError, MetadataView, NoMetadata};
pub use part::{
    Cardinality, Contract, CreationPolicy, ExportDefinition, ImportDefinition, PartBuilder,
    PartDefinition, PartId,
};
pub use registry::CompositionRegistry;
pub use set::{CompositionSet, CompositionSetLock};
pub use validation::{PolicyValidator, ResolutionApi};

#[cfg(test)]
mod tests;
