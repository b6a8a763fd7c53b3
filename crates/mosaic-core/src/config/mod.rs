//! Composition configuration.
//!
//! [`CompositionConfig`] controls policy validation and module discovery. It is
//! plain `serde` data and can be read from JSON, YAML (`yaml-config` feature)
//! or TOML (`toml-config` feature); the format follows the file extension.
pub mod error;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use error::ConfigError;

use crate::kernel::constants;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }
}

/// Settings for registries, hosts and module discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionConfig {
    /// Force creation-policy validation on or off. Unset follows the build
    /// profile: on with debug assertions, off otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate_creation_policy: Option<bool>,
    /// Discovery root used when a registry is initialized without one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_component_dir: Option<PathBuf>,
    /// File extensions (without the dot) treated as module candidates.
    pub module_extensions: Vec<String>,
    /// Descend into subdirectories of a discovery root.
    pub recursive_scan: bool,
    /// Ignore files whose name contains `.cache.`.
    pub skip_cache_files: bool,
    /// Semver requirement a module's declared API version must meet.
    pub api_requirement: String,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            validate_creation_policy: None,
            default_component_dir: None,
            module_extensions: vec![std::env::consts::DLL_EXTENSION.to_string()],
            recursive_scan: false,
            skip_cache_files: true,
            api_requirement: constants::DEFAULT_API_REQUIREMENT.to_string(),
        }
    }
}

impl CompositionConfig {
    /// Read a configuration file, choosing the format by extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::deserialize(&data, format)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn deserialize(data: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        match format {
            ConfigFormat::Json => serde_json::from_str(data).map_err(|e| ConfigError::Parse {
                format: "JSON",
                source: Box::new(e),
            }),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(data).map_err(|e| ConfigError::Parse {
                format: "YAML",
                source: Box::new(e),
            }),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(data).map_err(|e| ConfigError::Parse {
                format: "TOML",
                source: Box::new(e),
            }),
        }
    }

    pub fn serialize(&self, format: ConfigFormat) -> Result<String, ConfigError> {
        match format {
            ConfigFormat::Json => {
                serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
                    format: "JSON",
                    source: Box::new(e),
                })
            }
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(|e| ConfigError::Serialize {
                format: "YAML",
                source: Box::new(e),
            }),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
                format: "TOML",
                source: Box::new(e),
            }),
        }
    }

    /// Whether creation-policy validation is active.
    pub fn validation_enabled(&self) -> bool {
        self.validate_creation_policy
            .unwrap_or(cfg!(debug_assertions))
    }

    /// Whether `path` has one of the configured module extensions.
    pub fn is_module_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.module_extensions
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(ext))
            })
    }
}
