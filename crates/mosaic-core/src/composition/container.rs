//! # Composition Container
//!
//! The container resolves imports against the parts offered by a catalog plus
//! any parts composed into it explicitly. Shared parts get one instance per
//! container, created on first use; non-shared parts get a fresh instance on
//! every resolution.
//!
//! Exports are handed out as lazy handles ([`Export`], [`Lazy`]). Nothing is
//! constructed until a value is asked for.
use std::any::type_name;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use once_cell::sync::OnceCell;

use crate::composition::catalog::Catalog;
use crate::composition::error::{CompositionError, ResolutionFailure, Result};
use crate::composition::metadata::{Metadata, MetadataView, NoMetadata};
use crate::composition::part::{
    Cardinality, Contract, CreationPolicy, ErasedValue, ExportDefinition, ImportDefinition,
    PartDefinition, PartId, PartInstance, Sharing,
};
use crate::utils::{lock, read, write};

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(u64);

impl ContainerId {
    fn next() -> Self {
        ContainerId(NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container#{}", self.0)
    }
}

/// Outcome of a single-export lookup.
#[derive(Debug)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    /// More than one export matched; carries the number of matches.
    Ambiguous(usize),
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::NotFound => Lookup::NotFound,
            Lookup::Ambiguous(count) => Lookup::Ambiguous(count),
        }
    }

    /// Turn a miss into the matching resolution failure.
    pub fn into_result(self, contract: &Contract) -> Result<T> {
        match self {
            Lookup::Found(value) => Ok(value),
            Lookup::NotFound => Err(ResolutionFailure::NotFound {
                contract: contract.to_string(),
            }
            .into()),
            Lookup::Ambiguous(count) => Err(ResolutionFailure::Ambiguous {
                contract: contract.to_string(),
                count,
            }
            .into()),
        }
    }
}

// Parts being constructed on the current thread. A shared part that is
// re-entered while its instance cell is initializing would block forever, so
// cycles are caught here first.
thread_local! {
    static RESOLVING: RefCell<Vec<PartId>> = const { RefCell::new(Vec::new()) };
}

struct ResolutionGuard {
    part: PartId,
}

impl ResolutionGuard {
    fn enter(part: &PartDefinition) -> Result<Self> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&part.id()) {
                return Err(ResolutionFailure::Cycle {
                    part: part.name().to_string(),
                }
                .into());
            }
            stack.push(part.id());
            Ok(ResolutionGuard { part: part.id() })
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|id| *id == self.part) {
                stack.remove(pos);
            }
        });
    }
}

struct SharedSlot {
    instance: OnceCell<PartInstance>,
    // Keeps the definition (and the module it came from) alive while the
    // instance exists. Must stay after `instance`.
    _part: Arc<PartDefinition>,
}

pub(crate) struct ContainerInner {
    id: ContainerId,
    catalog: Arc<dyn Catalog>,
    // Owns the shared instances of every part its catalog offers.
    parent: Option<Arc<ContainerInner>>,
    composed: RwLock<Vec<Arc<PartDefinition>>>,
    shared: Mutex<HashMap<PartId, Arc<SharedSlot>>>,
    disposed: AtomicBool,
}

impl ContainerInner {
    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(CompositionError::ContainerDisposed)
        } else {
            Ok(())
        }
    }

    fn parts(&self) -> Vec<Arc<PartDefinition>> {
        let mut parts = self.catalog.parts();
        parts.extend(read(&self.composed).iter().cloned());
        parts
    }

    fn exports_for(self: &Arc<Self>, import: &ImportDefinition) -> Result<Vec<Export>> {
        self.ensure_live()?;
        let mut found = Vec::new();
        for part in self.parts() {
            let policy = part.creation_policy();
            for (index, export) in part.exports().iter().enumerate() {
                if import.accepts(export, policy) {
                    found.push(Export {
                        value: Arc::new(OnceCell::new()),
                        container: Arc::downgrade(self),
                        part: Arc::clone(&part),
                        index,
                        sharing: policy.sharing_for(import.required_policy()),
                    });
                }
            }
        }
        Ok(found)
    }

    fn offers(&self, part: &PartDefinition) -> bool {
        self.parts().iter().any(|offered| offered.id() == part.id())
    }

    fn instance_for(self: &Arc<Self>, part: &Arc<PartDefinition>, sharing: Sharing) -> Result<PartInstance> {
        self.ensure_live()?;
        if sharing == Sharing::Shared {
            if let Some(parent) = self.parent.as_ref().filter(|parent| parent.offers(part)) {
                return parent.instance_for(part, sharing);
            }
        }
        let _guard = ResolutionGuard::enter(part)?;
        match sharing {
            Sharing::NonShared => self.instantiate(part),
            Sharing::Shared => {
                let slot = {
                    let mut slots = lock(&self.shared);
                    Arc::clone(slots.entry(part.id()).or_insert_with(|| {
                        Arc::new(SharedSlot {
                            instance: OnceCell::new(),
                            _part: Arc::clone(part),
                        })
                    }))
                };
                slot.instance
                    .get_or_try_init(|| self.instantiate(part))
                    .cloned()
            }
        }
    }

    fn instantiate(self: &Arc<Self>, part: &Arc<PartDefinition>) -> Result<PartInstance> {
        let imports = self.resolve_imports(part.name(), part.imports())?;
        log::debug!("Constructing part '{}' in {}", part.name(), self.id);
        part.construct(&imports)
    }

    fn resolve_imports(self: &Arc<Self>, importer: &str, definitions: &[ImportDefinition]) -> Result<Imports> {
        let mut entries = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let exports = self.exports_for(definition)?;
            let contract = definition.contract();
            let failure = match (definition.cardinality(), exports.len()) {
                (Cardinality::ExactlyOne, 0) => Some(ResolutionFailure::NotFound {
                    contract: contract.to_string(),
                }),
                (Cardinality::ExactlyOne | Cardinality::ZeroOrOne, count) if count > 1 => {
                    Some(ResolutionFailure::Ambiguous {
                        contract: contract.to_string(),
                        count,
                    })
                }
                _ => None,
            };
            if let Some(failure) = failure {
                return Err(ResolutionFailure::ImportNotSatisfied {
                    importer: importer.to_string(),
                    contract: contract.to_string(),
                    source: Box::new(failure),
                }
                .into());
            }
            entries.push((definition.clone(), exports));
        }
        Ok(Imports {
            importer: importer.to_string(),
            entries,
        })
    }
}

/// A lazily realized export.
///
/// Cloning shares the realized value. The handle holds only a weak reference
/// to its container, so it must be realized while some handle to that
/// container is alive. Realizing it after the container was disposed fails
/// with [`CompositionError::ContainerDisposed`]; after the last container
/// handle was dropped, with [`CompositionError::ContainerDropped`].
#[derive(Clone)]
pub struct Export {
    // Dropped before `part`, which may be the last owner of the module
    // the value's code lives in.
    value: Arc<OnceCell<ErasedValue>>,
    container: Weak<ContainerInner>,
    part: Arc<PartDefinition>,
    index: usize,
    sharing: Sharing,
}

impl Export {
    pub fn definition(&self) -> &ExportDefinition {
        &self.part.exports()[self.index]
    }

    pub fn contract(&self) -> &Contract {
        self.definition().contract()
    }

    pub fn metadata(&self) -> &Metadata {
        self.definition().metadata()
    }

    /// Part that provides this export.
    pub fn part(&self) -> &Arc<PartDefinition> {
        &self.part
    }

    pub fn part_name(&self) -> &str {
        self.part.name()
    }

    pub fn creation_policy(&self) -> CreationPolicy {
        self.part.creation_policy()
    }

    pub fn is_value_created(&self) -> bool {
        self.value.get().is_some()
    }

    /// Realize the value, constructing the part if needed.
    pub fn value(&self) -> Result<ErasedValue> {
        self.value
            .get_or_try_init(|| {
                let container = self
                    .container
                    .upgrade()
                    .ok_or(CompositionError::ContainerDropped)?;
                let instance = container.instance_for(&self.part, self.sharing)?;
                self.definition().extract(&instance).ok_or_else(|| {
                    ResolutionFailure::TypeMismatch {
                        contract: self.contract().to_string(),
                        expected: self.contract().type_name(),
                    }
                    .into()
                })
            })
            .cloned()
    }

    /// Realize the value as `Arc<T>`.
    pub fn value_as<T>(&self) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let erased = self.value()?;
        erased.downcast_ref::<Arc<T>>().cloned().ok_or_else(|| {
            ResolutionFailure::TypeMismatch {
                contract: self.contract().to_string(),
                expected: type_name::<T>(),
            }
            .into()
        })
    }
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Export")
            .field("part", &self.part.name())
            .field("contract", self.contract())
            .field("sharing", &self.sharing)
            .field("created", &self.is_value_created())
            .finish()
    }
}

/// Typed lazy handle over an [`Export`] with a metadata view `M`.
pub struct Lazy<T: ?Sized, M = NoMetadata> {
    value: OnceCell<Arc<T>>,
    export: Export,
    metadata: M,
}

impl<T, M> Lazy<T, M>
where
    T: ?Sized + Send + Sync + 'static,
    M: MetadataView,
{
    /// Wrap exports whose metadata converts into `M`. Others are skipped.
    pub(crate) fn from_exports(exports: Vec<Export>) -> Vec<Self> {
        exports
            .into_iter()
            .filter_map(|export| match export.metadata().view::<M>() {
                Ok(metadata) => Some(Lazy {
                    value: OnceCell::new(),
                    export,
                    metadata,
                }),
                Err(e) => {
                    log::debug!("Skipping export of '{}': {}", export.part_name(), e);
                    None
                }
            })
            .collect()
    }
}

impl<T, M> Lazy<T, M>
where
    T: ?Sized + Send + Sync + 'static,
{
    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn export(&self) -> &Export {
        &self.export
    }

    pub fn creation_policy(&self) -> CreationPolicy {
        self.export.creation_policy()
    }

    pub fn is_value_created(&self) -> bool {
        self.value.get().is_some()
    }

    pub fn value(&self) -> Result<Arc<T>> {
        self.value
            .get_or_try_init(|| self.export.value_as::<T>())
            .cloned()
    }
}

impl<T: ?Sized, M: fmt::Debug> fmt::Debug for Lazy<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("export", &self.export)
            .field("metadata", &self.metadata)
            .field("created", &self.value.get().is_some())
            .finish()
    }
}

/// Resolved imports handed to a part factory or an ad-hoc part.
///
/// Only contracts the part declared can be read; anything else is an
/// [`ResolutionFailure::UndeclaredImport`].
pub struct Imports {
    importer: String,
    entries: Vec<(ImportDefinition, Vec<Export>)>,
}

impl Imports {
    /// No declared imports.
    pub fn empty(importer: impl Into<String>) -> Self {
        Self {
            importer: importer.into(),
            entries: Vec::new(),
        }
    }

    pub fn importer(&self) -> &str {
        &self.importer
    }

    /// Exports matched for a declared contract.
    pub fn exports(&self, contract: &Contract) -> Result<&[Export]> {
        self.entries
            .iter()
            .find(|(definition, _)| definition.contract() == contract)
            .map(|(_, exports)| exports.as_slice())
            .ok_or_else(|| {
                ResolutionFailure::UndeclaredImport {
                    importer: self.importer.clone(),
                    contract: contract.to_string(),
                }
                .into()
            })
    }

    /// The single value for `T`.
    pub fn one<T>(&self) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let contract = Contract::of::<T>();
        self.single::<T>(&contract)?
            .ok_or_else(|| ResolutionFailure::NotFound { contract: contract.to_string() }.into())
    }

    /// The single value for `T` under a named contract.
    pub fn one_named<T>(&self, name: &str) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let contract = Contract::named::<T>(name);
        self.single::<T>(&contract)?
            .ok_or_else(|| ResolutionFailure::NotFound { contract: contract.to_string() }.into())
    }

    /// The value for an optional import, if one matched.
    pub fn optional<T>(&self) -> Result<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.single::<T>(&Contract::of::<T>())
    }

    /// Every value for a collection import.
    pub fn many<T>(&self) -> Result<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.exports(&Contract::of::<T>())?
            .iter()
            .map(Export::value_as::<T>)
            .collect()
    }

    /// Lazy handles for a collection import, filtered by metadata view.
    pub fn lazy<T, M>(&self) -> Result<Vec<Lazy<T, M>>>
    where
        T: ?Sized + Send + Sync + 'static,
        M: MetadataView,
    {
        let exports = self.exports(&Contract::of::<T>())?.to_vec();
        Ok(Lazy::from_exports(exports))
    }

    fn single<T>(&self, contract: &Contract) -> Result<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.exports(contract)? {
            [] => Ok(None),
            [export] => export.value_as::<T>().map(Some),
            many => Err(ResolutionFailure::Ambiguous {
                contract: contract.to_string(),
                count: many.len(),
            }
            .into()),
        }
    }
}

/// An object whose imports are satisfied after it was constructed elsewhere.
pub trait ComposablePart {
    /// Imports this object needs.
    fn imports(&self) -> Vec<ImportDefinition>;

    /// Receive the resolved imports.
    fn on_imports_satisfied(&mut self, imports: &Imports) -> Result<()>;

    fn part_name(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// A set of parts to add to and remove from a container in one step.
#[derive(Default)]
pub struct CompositionBatch {
    added: Vec<PartDefinition>,
    removed: Vec<PartId>,
}

impl CompositionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_part(&mut self, part: PartDefinition) -> PartId {
        let id = part.id();
        self.added.push(part);
        id
    }

    /// Add an existing value as a shared export of `T`.
    pub fn add_exported_value<T>(&mut self, value: Arc<T>) -> PartId
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.add_part(PartDefinition::from_value(Contract::of::<T>(), value))
    }

    /// Add an existing value under a named contract.
    pub fn add_exported_value_named<T>(&mut self, contract_name: impl Into<String>, value: Arc<T>) -> PartId
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.add_part(PartDefinition::from_value(Contract::named::<T>(contract_name), value))
    }

    /// Remove a part previously composed into the container.
    pub fn remove_part(&mut self, id: PartId) {
        self.removed.push(id);
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Resolves imports and hands out exports over a catalog.
///
/// Cheap to clone; clones share one container.
#[derive(Clone)]
pub struct CompositionContainer {
    inner: Arc<ContainerInner>,
}

impl CompositionContainer {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self::build(catalog, None)
    }

    /// Container whose shared parts come from `parent` whenever `parent`
    /// offers them. Non-shared parts and parts only this container sees are
    /// instantiated here.
    pub fn with_parent(catalog: Arc<dyn Catalog>, parent: &CompositionContainer) -> Self {
        Self::build(catalog, Some(Arc::clone(&parent.inner)))
    }

    fn build(catalog: Arc<dyn Catalog>, parent: Option<Arc<ContainerInner>>) -> Self {
        let id = ContainerId::next();
        match &parent {
            Some(parent) => log::debug!("Created {} under {}", id, parent.id),
            None => log::debug!("Created {}", id),
        }
        Self {
            inner: Arc::new(ContainerInner {
                id,
                catalog,
                parent,
                composed: RwLock::new(Vec::new()),
                shared: Mutex::new(HashMap::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> ContainerId {
        self.inner.id
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.inner.catalog
    }

    /// Every part visible to this container: catalog parts then composed parts.
    pub fn parts(&self) -> Vec<Arc<PartDefinition>> {
        self.inner.parts()
    }

    /// All exports matching `import`, unrealized. Cardinality is not enforced.
    pub fn get_exports(&self, import: &ImportDefinition) -> Result<Vec<Export>> {
        self.inner.exports_for(import)
    }

    /// The one export matching `import`, distinguishing misses from ambiguity.
    pub fn find_single(&self, import: &ImportDefinition) -> Result<Lookup<Export>> {
        let mut exports = self.inner.exports_for(import)?;
        Ok(match exports.len() {
            0 => Lookup::NotFound,
            1 => Lookup::Found(exports.remove(0)),
            count => Lookup::Ambiguous(count),
        })
    }

    pub fn get_export(&self, import: &ImportDefinition) -> Result<Export> {
        self.find_single(import)?.into_result(import.contract())
    }

    pub fn get_exported_value<T>(&self) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get_export(&ImportDefinition::exactly_one::<T>())?
            .value_as::<T>()
    }

    pub fn get_exported_value_named<T>(&self, contract_name: &str) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get_export(&ImportDefinition::exactly_one::<T>().named(contract_name))?
            .value_as::<T>()
    }

    pub fn get_exported_values<T>(&self) -> Result<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get_exports(&ImportDefinition::zero_or_more::<T>())?
            .iter()
            .map(Export::value_as::<T>)
            .collect()
    }

    /// Resolve and deliver the imports of an object created outside the container.
    pub fn satisfy_imports_once(&self, part: &mut dyn ComposablePart) -> Result<()> {
        self.inner.ensure_live()?;
        let imports = self.inner.resolve_imports(part.part_name(), &part.imports())?;
        part.on_imports_satisfied(&imports)
    }

    /// Apply a batch of additions and removals.
    pub fn compose(&self, batch: CompositionBatch) -> Result<()> {
        self.inner.ensure_live()?;
        if batch.is_empty() {
            return Ok(());
        }
        let CompositionBatch { added, removed } = batch;

        let dropped_slots: Vec<Arc<SharedSlot>> = {
            let mut shared = lock(&self.inner.shared);
            removed.iter().filter_map(|id| shared.remove(id)).collect()
        };
        {
            let mut composed = write(&self.inner.composed);
            composed.retain(|part| !removed.contains(&part.id()));
            composed.extend(added.into_iter().map(Arc::new));
        }
        log::debug!(
            "Composed into {}: {} removed, {} shared instances released",
            self.inner.id,
            removed.len(),
            dropped_slots.len()
        );
        drop(dropped_slots);
        Ok(())
    }

    /// Number of shared instances created so far.
    pub fn shared_instance_count(&self) -> usize {
        lock(&self.inner.shared)
            .values()
            .filter(|slot| slot.instance.get().is_some())
            .count()
    }

    /// Release every shared instance and composed part. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Instances are dropped outside the locks; their destructors may call back in.
        let slots: Vec<Arc<SharedSlot>> = lock(&self.inner.shared).drain().map(|(_, slot)| slot).collect();
        let composed = std::mem::take(&mut *write(&self.inner.composed));
        log::debug!(
            "Disposed {} ({} shared instances, {} composed parts)",
            self.inner.id,
            slots.len(),
            composed.len()
        );
        drop(slots);
        drop(composed);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CompositionContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositionContainer")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
