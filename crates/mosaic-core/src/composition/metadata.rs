//! Export metadata.
//!
//! Metadata is a string-keyed map of JSON values attached to an export.
//! Consumers read it through a typed view: any `serde` deserializable
//! struct is a [`MetadataView`], so a view like
//!
//! ```
//! #[derive(serde::Deserialize)]
//! struct Labelled {
//!     #[serde(rename = "Label")]
//!     label: String,
//! }
//! ```
//!
//! can be requested with `host.get_exports_with_metadata::<dyn Thing, Labelled>()`.
use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Metadata cannot be viewed as '{view}': {message}")]
    View { view: &'static str, message: String },

    #[error("Metadata value for '{key}' cannot be encoded: {message}")]
    Encode { key: String, message: String },
}

/// Metadata declared on a single export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    entries: BTreeMap<String, Value>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert for values that are already JSON-compatible.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Insert any serializable value.
    pub fn insert<V: Serialize>(&mut self, key: impl Into<String>, value: V) -> Result<(), MetadataError> {
        let key = key.into();
        let encoded = serde_json::to_value(value).map_err(|e| MetadataError::Encode {
            key: key.clone(),
            message: e.to_string(),
        })?;
        self.entries.insert(key, encoded);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Convert into a typed view.
    pub fn view<M: MetadataView>(&self) -> Result<M, MetadataError> {
        M::from_metadata(self)
    }

    fn to_object(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// A typed shape over an export's [`Metadata`].
pub trait MetadataView: Sized + Send + Sync + 'static {
    fn from_metadata(metadata: &Metadata) -> Result<Self, MetadataError>;
}

impl<T> MetadataView for T
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn from_metadata(metadata: &Metadata) -> Result<Self, MetadataError> {
        serde_json::from_value(metadata.to_object()).map_err(|e| MetadataError::View {
            view: std::any::type_name::<T>(),
            message: e.to_string(),
        })
    }
}

/// View used when the caller does not care about metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoMetadata;

impl<'de> Deserialize<'de> for NoMetadata {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde::de::IgnoredAny::deserialize(deserializer)?;
        Ok(NoMetadata)
    }
}
