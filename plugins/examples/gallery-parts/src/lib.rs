//! Example plugin module for Mosaic.
//!
//! Exports a shared in-memory [`AlbumStore`] and a non-shared
//! [`ThumbnailRenderer`] that imports the store. Build it as a `cdylib` and
//! point `mosaic parts` at the output directory to see both parts.
use std::collections::BTreeMap;
use std::sync::Arc;

use log::info;
use mosaic_core::composition::{
    CompositionError, CreationPolicy, ImportDefinition, PartBuilder,
};
use mosaic_core::plugin_system::ModuleRegistrar;
use serde::Deserialize;

const STORE_PART: &str = "gallery.album-store";
const RENDERER_PART: &str = "gallery.thumbnail-renderer";
const STORE_LABEL: &str = "in-memory";
const ALBUM_CAPACITY: u32 = 64;
const THUMBNAIL_SIZE: u32 = 128;

/// Read access to photo albums.
pub trait AlbumStore: Send + Sync {
    fn albums(&self) -> Vec<String>;
    fn photos(&self, album: &str) -> Vec<String>;
}

/// Produces thumbnail names for the photos of an album.
pub trait ThumbnailRenderer: Send + Sync {
    fn render(&self, album: &str) -> Vec<String>;
    fn size(&self) -> u32;
}

/// Metadata attached to the album store export.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StoreInfo {
    #[serde(rename = "Label")]
    pub label: String,
    #[serde(rename = "Capacity")]
    pub capacity: u32,
}

#[derive(Debug)]
pub struct InMemoryAlbumStore {
    albums: BTreeMap<String, Vec<String>>,
}

impl Default for InMemoryAlbumStore {
    fn default() -> Self {
        let mut albums = BTreeMap::new();
        albums.insert(
            "holidays".to_string(),
            vec!["beach.jpg".to_string(), "sunset.jpg".to_string()],
        );
        albums.insert("pets".to_string(), vec!["cat.png".to_string()]);
        Self { albums }
    }
}

impl AlbumStore for InMemoryAlbumStore {
    fn albums(&self) -> Vec<String> {
        self.albums.keys().cloned().collect()
    }

    fn photos(&self, album: &str) -> Vec<String> {
        self.albums.get(album).cloned().unwrap_or_default()
    }
}

pub struct GridRenderer {
    store: Arc<dyn AlbumStore>,
    size: u32,
}

impl GridRenderer {
    pub fn new(store: Arc<dyn AlbumStore>, size: u32) -> Self {
        Self { store, size }
    }
}

impl ThumbnailRenderer for GridRenderer {
    fn render(&self, album: &str) -> Vec<String> {
        self.store
            .photos(album)
            .iter()
            .map(|photo| format!("thumb_{}px/{}", self.size, photo))
            .collect()
    }

    fn size(&self) -> u32 {
        self.size
    }
}

/// Registers the parts of this module.
pub fn register(registrar: &mut ModuleRegistrar) -> Result<(), CompositionError> {
    registrar.register(
        PartBuilder::<InMemoryAlbumStore>::from_default()
            .named(STORE_PART)
            .export::<dyn AlbumStore>(|store| store as Arc<dyn AlbumStore>)
            .with_metadata("Label", STORE_LABEL)
            .with_metadata("Capacity", ALBUM_CAPACITY)
            .expect_metadata::<StoreInfo>()
            .build()?,
    );

    registrar.register(
        PartBuilder::<GridRenderer>::new(|imports| {
            Ok(GridRenderer::new(imports.one::<dyn AlbumStore>()?, THUMBNAIL_SIZE))
        })
        .named(RENDERER_PART)
        .creation_policy(CreationPolicy::NonShared)
        .import(ImportDefinition::exactly_one::<dyn AlbumStore>())
        .export::<dyn ThumbnailRenderer>(|renderer| renderer as Arc<dyn ThumbnailRenderer>)
        .with_metadata("Size", THUMBNAIL_SIZE)
        .build()?,
    );

    info!("Registered {} gallery parts", registrar.part_count());
    Ok(())
}

mosaic_core::export_module!(register);

#[cfg(test)]
mod tests;
