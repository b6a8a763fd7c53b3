// Parts, catalogs and a fake module loader shared by the composition tests.
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::composition::catalog::{Catalog, TypeCatalog};
use crate::composition::container::{ComposablePart, Imports};
use crate::composition::error::Result;
use crate::composition::part::{CreationPolicy, ImportDefinition, PartBuilder, PartDefinition};
use crate::config::CompositionConfig;
use crate::plugin_system::error::ModuleLoadError;
use crate::plugin_system::loader::ModuleLoader;

pub trait Greeter: Send + Sync + std::fmt::Debug {
    fn greet(&self) -> String;
}

#[derive(Debug)]
pub struct Named(pub String);

impl Greeter for Named {
    fn greet(&self) -> String {
        format!("hello from {}", self.0)
    }
}

/// Part exporting `dyn Greeter` with `Label` metadata. Counts constructions.
pub fn greeter_part(name: &str, policy: CreationPolicy, constructed: Arc<AtomicUsize>) -> PartDefinition {
    let label = name.to_string();
    PartBuilder::<Named>::new(move |_| {
        constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Named(label.clone()))
    })
    .named(name)
    .creation_policy(policy)
    .export::<dyn Greeter>(|p| p as Arc<dyn Greeter>)
    .with_metadata("Label", name)
    .build()
    .unwrap()
}

pub fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

pub fn catalog_of(parts: Vec<PartDefinition>) -> Arc<dyn Catalog> {
    Arc::new(TypeCatalog::new(parts))
}

pub fn validating_config() -> CompositionConfig {
    CompositionConfig {
        validate_creation_policy: Some(true),
        ..Default::default()
    }
}

pub fn permissive_config() -> CompositionConfig {
    CompositionConfig {
        validate_creation_policy: Some(false),
        ..Default::default()
    }
}

/// Catalog that counts how often it was disposed.
pub struct TrackingCatalog {
    pub inner: Arc<dyn Catalog>,
    pub disposed: Arc<AtomicUsize>,
}

impl Catalog for TrackingCatalog {
    fn parts(&self) -> Vec<Arc<PartDefinition>> {
        self.inner.parts()
    }

    fn dispose(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Ad-hoc object importing every greeter.
#[derive(Default)]
pub struct Dashboard {
    pub greeters: Vec<Arc<dyn Greeter>>,
    pub from_catalog: bool,
}

impl ComposablePart for Dashboard {
    fn imports(&self) -> Vec<ImportDefinition> {
        vec![ImportDefinition::zero_or_more::<dyn Greeter>()]
    }

    fn on_imports_satisfied(&mut self, imports: &Imports) -> Result<()> {
        self.greeters = imports.many::<dyn Greeter>()?;
        Ok(())
    }
}

/// Treats `*.part` files as modules exporting one shared greeter named after
/// the file stem, and `*.bad` files as corrupt modules.
#[derive(Default)]
pub struct FakeLoader {
    pub loads: AtomicUsize,
}

impl ModuleLoader for FakeLoader {
    fn is_candidate(&self, path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("part") | Some("bad")
        )
    }

    fn load(&self, path: &Path) -> std::result::Result<Arc<dyn Catalog>, ModuleLoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if path.extension().is_some_and(|e| e == "bad") {
            return Err(ModuleLoadError::NotABinary {
                path: path.to_path_buf(),
            });
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("module")
            .to_string();
        Ok(catalog_of(vec![greeter_part(&stem, CreationPolicy::Shared, counter())]))
    }
}
