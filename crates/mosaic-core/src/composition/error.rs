//! # Mosaic Core Composition Errors
//!
//! Defines error types specific to the composition core.
//!
//! [`CompositionError`] is returned by every resolution, composition and
//! lifecycle operation. Resolution problems (no match, several matches,
//! dependency cycles, unsatisfied imports) are grouped under
//! [`ResolutionFailure`] so callers can tell them apart from usage errors
//! such as [`CompositionError::PolicyViolation`] or
//! [`CompositionError::HostDisposed`].
use std::path::PathBuf;

use crate::composition::metadata::MetadataError;
use crate::composition::part::CreationPolicy;
use crate::composition::validation::ResolutionApi;

#[derive(Debug, thiserror::Error)]
pub enum ResolutionFailure {
    #[error("No exports were found that match the contract '{contract}'")]
    NotFound { contract: String },

    #[error("{count} exports match the contract '{contract}' but exactly one was expected")]
    Ambiguous { contract: String, count: usize },

    #[error("Part '{part}' depends on itself through its imports")]
    Cycle { part: String },

    #[error("Import '{contract}' of '{importer}' could not be satisfied: {source}")]
    ImportNotSatisfied {
        importer: String,
        contract: String,
        #[source]
        source: Box<ResolutionFailure>,
    },

    #[error("'{importer}' requested '{contract}' without declaring it as an import")]
    UndeclaredImport { importer: String, contract: String },

    #[error("Export for contract '{contract}' is not a '{expected}'")]
    TypeMismatch {
        contract: String,
        expected: &'static str,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    #[error("Resolution failed: {0}")]
    Resolution(#[from] ResolutionFailure),

    #[error(
        "Exported type '{type_name}' is declared {policy:?} but was resolved through the {api} API. {remedy}"
    )]
    PolicyViolation {
        type_name: String,
        policy: CreationPolicy,
        api: ResolutionApi,
        remedy: String,
    },

    #[error("The composition host has been disposed")]
    HostDisposed,

    #[error("The composition container has been disposed")]
    ContainerDisposed,

    #[error("The composition container was dropped before this export was realized")]
    ContainerDropped,

    #[error("Composition set for '{}' has been disposed", root.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<unscoped>".into()))]
    SetDisposed { root: Option<PathBuf> },

    #[error("Composition set for '{}' is still in use ({locks} locks, {hosts} hosts)", root.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<unscoped>".into()))]
    SetInUse {
        root: Option<PathBuf>,
        locks: usize,
        hosts: usize,
    },

    #[error("Part '{part}' failed to construct: {message}")]
    PartConstruction { part: String, message: String },

    #[error("Invalid part definition for '{part}': {message}")]
    InvalidPart { part: String, message: String },

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Discovery root '{path}' could not be scanned: {source}")]
    DiscoveryRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompositionError {
    /// Helper for part factories reporting their own failures.
    pub fn construction(part: impl Into<String>, message: impl Into<String>) -> Self {
        CompositionError::PartConstruction {
            part: part.into(),
            message: message.into(),
        }
    }

    /// True for failures produced by the composition engine while resolving or
    /// constructing parts. The `_or_default` entry points turn these into `None`.
    pub fn is_composition_failure(&self) -> bool {
        matches!(
            self,
            CompositionError::Resolution(_) | CompositionError::PartConstruction { .. }
        )
    }

    /// True when the failure is "nothing matched the contract".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CompositionError::Resolution(ResolutionFailure::NotFound { .. })
        )
    }
}

/// Shorthand for results of composition operations
pub type Result<T> = std::result::Result<T, CompositionError>;
