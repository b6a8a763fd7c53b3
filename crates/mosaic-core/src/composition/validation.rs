//! Creation-policy checks for the host's shared and non-shared resolution APIs.
//!
//! The host exposes separate entry points for shared and non-shared values.
//! Resolving an export through the wrong one (a `NonShared` part through a
//! shared getter, or a `Shared`/`Any` part through a non-shared getter) is a
//! programming mistake, reported as [`CompositionError::PolicyViolation`]
//! before any value is realized. Checking can be switched off, in which case
//! every export passes.
use std::fmt;

use crate::composition::container::Export;
use crate::composition::error::{CompositionError, Result};
use crate::composition::part::CreationPolicy;

/// Which family of host getters a request came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionApi {
    Shared,
    NonShared,
}

impl ResolutionApi {
    fn accepts(self, policy: CreationPolicy) -> bool {
        match self {
            ResolutionApi::Shared => matches!(policy, CreationPolicy::Shared | CreationPolicy::Any),
            ResolutionApi::NonShared => policy == CreationPolicy::NonShared,
        }
    }
}

impl fmt::Display for ResolutionApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionApi::Shared => write!(f, "shared"),
            ResolutionApi::NonShared => write!(f, "non-shared"),
        }
    }
}

/// Checks exports against the API they are resolved through.
#[derive(Debug, Clone, Copy)]
pub struct PolicyValidator {
    enabled: bool,
}

impl PolicyValidator {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Validate a single export. `operation` names the host method for the log line.
    pub fn validate(&self, export: &Export, api: ResolutionApi, operation: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let policy = export.creation_policy();
        if api.accepts(policy) {
            return Ok(());
        }

        let type_name = export.contract().type_name().to_string();
        log::warn!(
            "{} resolved '{}' (declared {:?}) through the {} API",
            operation,
            type_name,
            policy,
            api
        );
        Err(CompositionError::PolicyViolation {
            remedy: remedy_for(policy, api),
            type_name,
            policy,
            api,
        })
    }

    /// Every export must be resolvable through the shared API. Empty input passes.
    pub fn validate_all_shared(&self, exports: &[Export], operation: &str) -> Result<()> {
        exports
            .iter()
            .try_for_each(|export| self.validate(export, ResolutionApi::Shared, operation))
    }

    /// At least one export must be NonShared; shared exports of the same
    /// contract may sit alongside it. Empty input passes.
    pub fn validate_any_non_shared(&self, exports: &[Export], operation: &str) -> Result<()> {
        if !self.enabled || exports.is_empty() {
            return Ok(());
        }
        if exports
            .iter()
            .any(|export| export.creation_policy() == CreationPolicy::NonShared)
        {
            return Ok(());
        }
        self.validate(&exports[0], ResolutionApi::NonShared, operation)
    }
}

fn remedy_for(policy: CreationPolicy, api: ResolutionApi) -> String {
    match (policy, api) {
        (CreationPolicy::NonShared, _) => {
            "Use the non-shared getters, or declare the part Shared.".to_string()
        }
        (CreationPolicy::Any, _) => {
            "Parts declared Any are shared by default; declare the part NonShared to get a fresh instance per request.".to_string()
        }
        _ => "Use the shared getters, or declare the part NonShared.".to_string(),
    }
}
