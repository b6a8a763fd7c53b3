//! API version gating for plugin modules.
//!
//! Every module reports the core API version it was compiled against. The
//! loader accepts it only if it satisfies the configured [`VersionRange`].
use std::fmt;
use std::str::FromStr;

use semver::{Version, VersionReq};

use crate::kernel::constants;

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("Invalid version '{input}': {source}")]
    Version {
        input: String,
        #[source]
        source: semver::Error,
    },

    #[error("Invalid version requirement '{input}': {source}")]
    Requirement {
        input: String,
        #[source]
        source: semver::Error,
    },
}

/// Parse a version string such as `"0.1.0"`.
pub fn parse_version(input: &str) -> Result<Version, VersionError> {
    Version::parse(input.trim()).map_err(|source| VersionError::Version {
        input: input.to_string(),
        source,
    })
}

/// The API version of this build of the core.
pub fn api_version() -> Result<Version, VersionError> {
    parse_version(constants::API_VERSION)
}

/// A semver requirement, remembered in the form it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    constraint: String,
    req: VersionReq,
}

impl VersionRange {
    pub fn parse(constraint: &str) -> Result<Self, VersionError> {
        let req = VersionReq::parse(constraint).map_err(|source| VersionError::Requirement {
            input: constraint.to_string(),
            source,
        })?;
        Ok(Self {
            constraint: constraint.to_string(),
            req,
        })
    }

    pub fn includes(&self, version: &Version) -> bool {
        self.req.matches(version)
    }

    /// Parse `version` and check it against the range.
    pub fn includes_str(&self, version: &str) -> Result<bool, VersionError> {
        parse_version(version).map(|v| self.includes(&v))
    }

    pub fn constraint(&self) -> &str {
        &self.constraint
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.constraint)
    }
}
