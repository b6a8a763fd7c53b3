//! # Composition Hosts
//!
//! A [`CompositionHost`] is a consumer's view of a composition set: a private
//! container over the set's catalog, extended with whatever catalogs the
//! consumer adds, plus a list of cleanup actions run at disposal.
//!
//! Shared values come from the `get_shared_*` getters, fresh instances from
//! the `get_non_shared_*` getters and [`create_instance`]. Using the wrong
//! family for a part's creation policy is reported as a
//! [`CompositionError::PolicyViolation`] when validation is enabled.
//!
//! [`create_instance`]: CompositionHost::create_instance
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::composition::catalog::{AggregateCatalog, Catalog};
use crate::composition::container::{
    ComposablePart, CompositionBatch, CompositionContainer, Export, Lazy, Lookup,
};
use crate::composition::error::{CompositionError, ResolutionFailure, Result};
use crate::composition::host_manager::HostManager;
use crate::composition::metadata::{MetadataView, NoMetadata};
use crate::composition::part::{Contract, ImportDefinition, PartDefinition};
use crate::composition::set::CompositionSet;
use crate::composition::validation::{PolicyValidator, ResolutionApi};
use crate::utils::lock;

static NEXT_HOST_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(u64);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host#{}", self.0)
    }
}

type CleanupAction = Box<dyn FnOnce() + Send>;

pub(crate) struct HostInner {
    id: HostId,
    container: CompositionContainer,
    additions: Arc<AggregateCatalog>,
    set: Weak<CompositionSet>,
    manager: Option<Weak<HostManager>>,
    validator: PolicyValidator,
    cleanup: Mutex<Vec<CleanupAction>>,
    disposed: AtomicBool,
}

impl HostInner {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(manager) = self.manager.as_ref().and_then(Weak::upgrade) {
            manager.deregister(self.id);
        }
        if let Some(set) = self.set.upgrade() {
            set.remove_from_set(self.container.id());
        }
        self.container.dispose();
        self.additions.dispose();

        let actions = std::mem::take(&mut *lock(&self.cleanup));
        let count = actions.len();
        for action in actions {
            action();
        }
        log::info!("Disposed host {} ({} cleanup actions run)", self.id, count);
    }
}

impl Drop for HostInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Per-consumer façade over a composition container.
///
/// Handles are cheap to clone. The host is disposed by [`dispose`](Self::dispose)
/// or when the last handle is dropped.
#[derive(Clone)]
pub struct CompositionHost {
    inner: Arc<HostInner>,
}

impl CompositionHost {
    pub(crate) fn new(
        container: CompositionContainer,
        additions: Arc<AggregateCatalog>,
        set: Weak<CompositionSet>,
        manager: Option<Weak<HostManager>>,
        validator: PolicyValidator,
    ) -> Self {
        let id = HostId(NEXT_HOST_ID.fetch_add(1, Ordering::Relaxed));
        let inner = Arc::new(HostInner {
            id,
            container,
            additions,
            set,
            manager,
            validator,
            cleanup: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        });
        if let Some(manager) = inner.manager.as_ref().and_then(Weak::upgrade) {
            manager.register(id, Arc::downgrade(&inner));
        }
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<HostInner>) -> Self {
        Self { inner }
    }

    fn live(&self) -> Result<&HostInner> {
        if self.inner.disposed.load(Ordering::Acquire) {
            Err(CompositionError::HostDisposed)
        } else {
            Ok(&self.inner)
        }
    }

    pub fn id(&self) -> HostId {
        self.inner.id
    }

    pub fn container(&self) -> &CompositionContainer {
        &self.inner.container
    }

    /// Whether creation-policy validation runs for this host.
    pub fn validation_enabled(&self) -> bool {
        self.inner.validator.is_enabled()
    }

    /// Resolve a registered export of `T` as a fresh instance, or construct
    /// `T::default()` and satisfy its imports when nothing exports `T`.
    ///
    /// Several exports of `T` are an error, not a reason to construct.
    pub fn create_instance<T>(&self) -> Result<Arc<T>>
    where
        T: ComposablePart + Default + Send + Sync + 'static,
    {
        let inner = self.live()?;
        let import = ImportDefinition::exactly_one::<T>();
        match inner.container.find_single(&import)? {
            Lookup::Found(export) => {
                inner
                    .validator
                    .validate(&export, ResolutionApi::NonShared, "create_instance")?;
                export.value_as::<T>()
            }
            Lookup::NotFound => self.compose_new::<T>(),
            Lookup::Ambiguous(count) => Err(ResolutionFailure::Ambiguous {
                contract: import.contract().to_string(),
                count,
            }
            .into()),
        }
    }

    /// Construct `T::default()` and satisfy its imports once. The object is
    /// not tracked by the container.
    pub fn compose_new<T>(&self) -> Result<Arc<T>>
    where
        T: ComposablePart + Default + Send + Sync + 'static,
    {
        let inner = self.live()?;
        let mut value = T::default();
        inner.container.satisfy_imports_once(&mut value)?;
        log::debug!("Composed ad-hoc '{}' in host {}", value.part_name(), inner.id);
        Ok(Arc::new(value))
    }

    /// The single shared export of `T`.
    pub fn get_shared_exported_value<T>(&self) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let inner = self.live()?;
        let export = inner.container.get_export(&ImportDefinition::exactly_one::<T>())?;
        inner
            .validator
            .validate(&export, ResolutionApi::Shared, "get_shared_exported_value")?;
        export.value_as::<T>()
    }

    /// Like [`get_shared_exported_value`](Self::get_shared_exported_value),
    /// but resolution and construction failures yield `None`.
    pub fn get_shared_exported_value_or_default<T>(&self) -> Result<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.get_shared_exported_value::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_composition_failure() => {
                log::debug!("No shared value for '{}': {}", std::any::type_name::<T>(), e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Single shared lookup that reports misses and ambiguity without failing.
    pub fn try_get_shared_exported_value<T>(&self) -> Result<Lookup<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let inner = self.live()?;
        match inner.container.find_single(&ImportDefinition::exactly_one::<T>())? {
            Lookup::Found(export) => {
                inner.validator.validate(
                    &export,
                    ResolutionApi::Shared,
                    "try_get_shared_exported_value",
                )?;
                export.value_as::<T>().map(Lookup::Found)
            }
            Lookup::NotFound => Ok(Lookup::NotFound),
            Lookup::Ambiguous(count) => Ok(Lookup::Ambiguous(count)),
        }
    }

    /// A fresh instance of the single non-shared export of `T`.
    pub fn get_non_shared_exported_value<T>(&self) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let inner = self.live()?;
        let export = inner.container.get_export(&ImportDefinition::exactly_one::<T>())?;
        inner.validator.validate(
            &export,
            ResolutionApi::NonShared,
            "get_non_shared_exported_value",
        )?;
        export.value_as::<T>()
    }

    /// Every shared export of `T`.
    pub fn get_shared_exported_values<T>(&self) -> Result<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let inner = self.live()?;
        let exports = inner.container.get_exports(&ImportDefinition::zero_or_more::<T>())?;
        inner
            .validator
            .validate_all_shared(&exports, "get_shared_exported_values")?;
        exports.iter().map(Export::value_as::<T>).collect()
    }

    /// Every export of `T`, where at least one must be non-shared.
    pub fn get_non_shared_exported_values<T>(&self) -> Result<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let inner = self.live()?;
        let exports = inner.container.get_exports(&ImportDefinition::zero_or_more::<T>())?;
        inner
            .validator
            .validate_any_non_shared(&exports, "get_non_shared_exported_values")?;
        exports.iter().map(Export::value_as::<T>).collect()
    }

    /// The single export of `T` registered under `contract_name`. Not policy-checked.
    pub fn get_exported_value<T>(&self, contract_name: &str) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.live()?.container.get_exported_value_named::<T>(contract_name)
    }

    /// Lazy handles for every export of `T`.
    pub fn get_exports<T>(&self) -> Result<Vec<Lazy<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get_exports_with_metadata::<T, NoMetadata>()
    }

    /// Lazy handles for exports of `T` whose metadata converts into `M`.
    pub fn get_exports_with_metadata<T, M>(&self) -> Result<Vec<Lazy<T, M>>>
    where
        T: ?Sized + Send + Sync + 'static,
        M: MetadataView,
    {
        let inner = self.live()?;
        let exports = inner.container.get_exports(&ImportDefinition::zero_or_more::<T>())?;
        Ok(Lazy::from_exports(exports))
    }

    /// Lazy handles for exports of `T` under a named contract.
    pub fn get_exports_named<T, M>(&self, contract_name: &str) -> Result<Vec<Lazy<T, M>>>
    where
        T: ?Sized + Send + Sync + 'static,
        M: MetadataView,
    {
        let inner = self.live()?;
        let import = ImportDefinition::zero_or_more::<T>().named(contract_name);
        Ok(Lazy::from_exports(inner.container.get_exports(&import)?))
    }

    /// Untyped lookup for callers that only know the contract at runtime.
    pub fn get_exports_by(&self, import: &ImportDefinition) -> Result<Vec<Export>> {
        self.live()?.container.get_exports(import)
    }

    pub fn compose(&self, batch: CompositionBatch) -> Result<()> {
        self.live()?.container.compose(batch)
    }

    /// Satisfy the imports of several ad-hoc objects. Stops at the first failure.
    pub fn compose_parts(&self, parts: &mut [&mut dyn ComposablePart]) -> Result<()> {
        let inner = self.live()?;
        for part in parts.iter_mut() {
            inner.container.satisfy_imports_once(&mut **part)?;
        }
        Ok(())
    }

    pub fn satisfy_imports_once(&self, part: &mut dyn ComposablePart) -> Result<()> {
        self.live()?.container.satisfy_imports_once(part)
    }

    /// Make the parts of `catalog` visible to this host. Disposed with the host.
    pub fn add_to_composition(&self, catalog: Arc<dyn Catalog>) -> Result<()> {
        let inner = self.live()?;
        inner.additions.add(catalog);
        log::debug!("Added catalog to host {}", inner.id);
        Ok(())
    }

    /// Register an action to run when the host is disposed.
    pub fn add_to_cleanup(&self, action: impl FnOnce() + Send + 'static) -> Result<()> {
        let inner = self.live()?;
        lock(&inner.cleanup).push(Box::new(action));
        Ok(())
    }

    /// Every part this host can resolve.
    pub fn parts(&self) -> Result<Vec<Arc<PartDefinition>>> {
        Ok(self.live()?.container.parts())
    }

    pub fn part_count(&self) -> Result<usize> {
        Ok(self.live()?.container.parts().len())
    }

    /// Whether any visible part exports `contract`.
    pub fn has_export(&self, contract: &Contract) -> Result<bool> {
        Ok(self
            .live()?
            .container
            .parts()
            .iter()
            .any(|part| part.exports_contract(contract)))
    }

    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CompositionHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositionHost")
            .field("id", &self.inner.id)
            .field("container", &self.inner.container)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
