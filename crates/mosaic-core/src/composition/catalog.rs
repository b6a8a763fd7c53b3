//! Part catalogs.
//!
//! A catalog is a source of [`PartDefinition`]s. Catalogs nest: an
//! [`AggregateCatalog`] unions others, a [`FilteredCatalog`] narrows one down.
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::composition::part::PartDefinition;
use crate::utils::lock;

/// A source of part definitions.
pub trait Catalog: Send + Sync {
    /// Snapshot of the parts currently offered.
    fn parts(&self) -> Vec<Arc<PartDefinition>>;

    /// Release resources held by the catalog. Defaults to nothing.
    fn dispose(&self) {}
}

/// Predicate deciding which parts a [`FilteredCatalog`] lets through.
pub trait CompositionFilter: Send + Sync {
    fn accepts(&self, part: &PartDefinition) -> bool;
}

impl<F> CompositionFilter for F
where
    F: Fn(&PartDefinition) -> bool + Send + Sync,
{
    fn accepts(&self, part: &PartDefinition) -> bool {
        self(part)
    }
}

/// A fixed list of parts.
#[derive(Debug, Default)]
pub struct TypeCatalog {
    parts: Vec<Arc<PartDefinition>>,
}

impl TypeCatalog {
    pub fn new(parts: impl IntoIterator<Item = PartDefinition>) -> Self {
        Self {
            parts: parts.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn add(&mut self, part: PartDefinition) {
        self.parts.push(Arc::new(part));
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl Catalog for TypeCatalog {
    fn parts(&self) -> Vec<Arc<PartDefinition>> {
        self.parts.clone()
    }
}

/// Union of other catalogs. Catalogs can be added while in use.
#[derive(Default)]
pub struct AggregateCatalog {
    catalogs: Mutex<Vec<Arc<dyn Catalog>>>,
}

impl AggregateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_catalogs(catalogs: impl IntoIterator<Item = Arc<dyn Catalog>>) -> Self {
        let aggregate = Self::new();
        for catalog in catalogs {
            aggregate.add(catalog);
        }
        aggregate
    }

    /// Add a catalog. Adding the same catalog twice has no effect.
    pub fn add(&self, catalog: Arc<dyn Catalog>) {
        let mut catalogs = lock(&self.catalogs);
        if catalogs.iter().any(|c| Arc::ptr_eq(c, &catalog)) {
            return;
        }
        catalogs.push(catalog);
    }

    pub fn catalog_count(&self) -> usize {
        lock(&self.catalogs).len()
    }
}

impl Catalog for AggregateCatalog {
    fn parts(&self) -> Vec<Arc<PartDefinition>> {
        // Snapshot first so nested catalogs are queried without our lock held.
        let catalogs = lock(&self.catalogs).clone();
        catalogs.iter().flat_map(|c| c.parts()).collect()
    }

    fn dispose(&self) {
        let catalogs = std::mem::take(&mut *lock(&self.catalogs));
        for catalog in catalogs {
            catalog.dispose();
        }
    }
}

impl fmt::Debug for AggregateCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateCatalog")
            .field("catalogs", &self.catalog_count())
            .finish()
    }
}

/// View of another catalog restricted by a [`CompositionFilter`].
///
/// Disposing the view leaves the underlying catalog alone; it is shared.
pub struct FilteredCatalog {
    inner: Arc<dyn Catalog>,
    filter: Arc<dyn CompositionFilter>,
}

impl FilteredCatalog {
    pub fn new(inner: Arc<dyn Catalog>, filter: Arc<dyn CompositionFilter>) -> Self {
        Self { inner, filter }
    }
}

impl Catalog for FilteredCatalog {
    fn parts(&self) -> Vec<Arc<PartDefinition>> {
        self.inner
            .parts()
            .into_iter()
            .filter(|part| self.filter.accepts(part))
            .collect()
    }
}
