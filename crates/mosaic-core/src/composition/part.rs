//! Part descriptors.
//!
//! A [`PartDefinition`] is the declarative record a catalog hands to a
//! container: which contracts the part exports (with metadata), which
//! contracts it imports, how it is shared, and how to construct it. Parts are
//! declared explicitly through [`PartBuilder`]:
//!
//! ```
//! use std::sync::Arc;
//! use mosaic_core::composition::{CreationPolicy, PartBuilder};
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! #[derive(Default)]
//! struct English;
//!
//! impl Greeter for English {
//!     fn greet(&self) -> String {
//!         "hello".into()
//!     }
//! }
//!
//! let part = PartBuilder::<English>::from_default()
//!     .creation_policy(CreationPolicy::Shared)
//!     .export::<dyn Greeter>(|p| p as Arc<dyn Greeter>)
//!     .with_metadata("Language", "en")
//!     .build()?;
//! assert_eq!(part.exports().len(), 1);
//! # Ok::<(), mosaic_core::composition::CompositionError>(())
//! ```
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::composition::container::Imports;
use crate::composition::error::{CompositionError, Result};
use crate::composition::metadata::{Metadata, MetadataView};
use crate::plugin_system::loader::LoadedModule;

/// A constructed part, type-erased. Holds the concrete part value.
pub type PartInstance = Arc<dyn Any + Send + Sync>;

/// A resolved export value, type-erased. Always holds an `Arc<T>` for the
/// exported type `T` (which may be unsized, e.g. a trait object).
pub type ErasedValue = Arc<dyn Any + Send + Sync>;

type PartFactory = Arc<dyn Fn(&Imports) -> Result<PartInstance> + Send + Sync>;
type ExportAccessor = Arc<dyn Fn(&PartInstance) -> Option<ErasedValue> + Send + Sync>;

static NEXT_PART_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a part definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartId(u64);

impl PartId {
    fn next() -> Self {
        PartId(NEXT_PART_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "part#{}", self.0)
    }
}

/// How instances of a part are shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CreationPolicy {
    /// Either; the importer decides. Resolves shared unless NonShared is required.
    Any,
    /// One instance per container.
    #[default]
    Shared,
    /// A fresh instance per resolution.
    NonShared,
}

impl CreationPolicy {
    /// Whether a part declared with `self` may satisfy an import requiring `required`.
    pub fn satisfies(self, required: CreationPolicy) -> bool {
        match required {
            CreationPolicy::Any => true,
            CreationPolicy::Shared => matches!(self, CreationPolicy::Shared | CreationPolicy::Any),
            CreationPolicy::NonShared => {
                matches!(self, CreationPolicy::NonShared | CreationPolicy::Any)
            }
        }
    }

    /// Effective sharing of a part with policy `self` resolved for an import requiring `required`.
    pub(crate) fn sharing_for(self, required: CreationPolicy) -> Sharing {
        match (self, required) {
            (CreationPolicy::NonShared, _) => Sharing::NonShared,
            (CreationPolicy::Any, CreationPolicy::NonShared) => Sharing::NonShared,
            _ => Sharing::Shared,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sharing {
    Shared,
    NonShared,
}

/// Contract an export is offered under and an import asks for.
///
/// Two contracts match when both the name and the exported type are equal.
/// The name defaults to the Rust type name of the exported type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Contract {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
}

impl Contract {
    /// Contract keyed by the type's own name.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::named::<T>(type_name::<T>())
    }

    /// Contract registered under an explicit name.
    pub fn named<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Contract built from runtime type information, for dynamic lookups.
    pub fn dynamic(name: impl Into<String>, type_id: TypeId, type_name: &'static str) -> Self {
        Self {
            name: name.into(),
            type_id,
            type_name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.type_name {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.type_name)
        }
    }
}

/// How many exports an import accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    ExactlyOne,
    ZeroOrOne,
    ZeroOrMore,
}

/// A requirement a part or ad-hoc object needs satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportDefinition {
    contract: Contract,
    cardinality: Cardinality,
    required_policy: CreationPolicy,
}

impl ImportDefinition {
    pub fn new(contract: Contract, cardinality: Cardinality) -> Self {
        Self {
            contract,
            cardinality,
            required_policy: CreationPolicy::Any,
        }
    }

    /// Single required import of `T`.
    pub fn exactly_one<T: ?Sized + 'static>() -> Self {
        Self::new(Contract::of::<T>(), Cardinality::ExactlyOne)
    }

    /// Optional single import of `T`.
    pub fn zero_or_one<T: ?Sized + 'static>() -> Self {
        Self::new(Contract::of::<T>(), Cardinality::ZeroOrOne)
    }

    /// Collection import of `T`.
    pub fn zero_or_more<T: ?Sized + 'static>() -> Self {
        Self::new(Contract::of::<T>(), Cardinality::ZeroOrMore)
    }

    /// Replace the contract name, keeping the type identity.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.contract.name = name.into();
        self
    }

    /// Only accept exports whose parts can be shared as `policy`.
    pub fn with_required_policy(mut self, policy: CreationPolicy) -> Self {
        self.required_policy = policy;
        self
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn required_policy(&self) -> CreationPolicy {
        self.required_policy
    }

    /// Whether an export of a part declared with `policy` satisfies this import.
    pub fn accepts(&self, export: &ExportDefinition, policy: CreationPolicy) -> bool {
        export.contract == self.contract && policy.satisfies(self.required_policy)
    }
}

/// A capability offered by a part.
#[derive(Clone)]
pub struct ExportDefinition {
    contract: Contract,
    metadata: Metadata,
    accessor: ExportAccessor,
}

impl ExportDefinition {
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub(crate) fn extract(&self, instance: &PartInstance) -> Option<ErasedValue> {
        (self.accessor)(instance)
    }
}

impl fmt::Debug for ExportDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportDefinition")
            .field("contract", &self.contract)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Declarative description of a component. Immutable once built.
pub struct PartDefinition {
    id: PartId,
    name: String,
    policy: CreationPolicy,
    exports: Vec<ExportDefinition>,
    imports: Vec<ImportDefinition>,
    factory: PartFactory,
    // Declared last: the factory and accessors may live in the module's code,
    // so they must be dropped before the library handle.
    origin: Option<Arc<LoadedModule>>,
}

impl PartDefinition {
    pub fn id(&self) -> PartId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn creation_policy(&self) -> CreationPolicy {
        self.policy
    }

    pub fn exports(&self) -> &[ExportDefinition] {
        &self.exports
    }

    pub fn imports(&self) -> &[ImportDefinition] {
        &self.imports
    }

    /// Module this part was registered by, if it came from a plugin module.
    pub fn origin(&self) -> Option<&Arc<LoadedModule>> {
        self.origin.as_ref()
    }

    /// Whether any export of this part is offered under `contract`.
    pub fn exports_contract(&self, contract: &Contract) -> bool {
        self.exports.iter().any(|e| &e.contract == contract)
    }

    pub(crate) fn construct(&self, imports: &Imports) -> Result<PartInstance> {
        (self.factory)(imports)
    }

    pub(crate) fn with_origin(mut self, origin: Arc<LoadedModule>) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Part wrapping an already constructed value, used by composition batches.
    pub(crate) fn from_value<T>(contract: Contract, value: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let name = format!("value of {}", contract);
        let factory: PartFactory = Arc::new(move |_imports: &Imports| {
            Ok(Arc::new(Arc::clone(&value)) as PartInstance)
        });
        let accessor: ExportAccessor = Arc::new(|instance: &PartInstance| {
            instance
                .downcast_ref::<Arc<T>>()
                .map(|v| Arc::new(Arc::clone(v)) as ErasedValue)
        });
        Self {
            id: PartId::next(),
            name,
            policy: CreationPolicy::Shared,
            exports: vec![ExportDefinition {
                contract,
                metadata: Metadata::new(),
                accessor,
            }],
            imports: Vec::new(),
            factory,
            origin: None,
        }
    }
}

impl fmt::Debug for PartDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("exports", &self.exports)
            .field("imports", &self.imports)
            .field("origin", &self.origin.as_ref().map(|m| m.path().to_path_buf()))
            .finish()
    }
}

/// Builder for [`PartDefinition`]s of concrete part type `P`.
pub struct PartBuilder<P> {
    name: String,
    policy: CreationPolicy,
    exports: Vec<ExportDefinition>,
    imports: Vec<ImportDefinition>,
    factory: PartFactory,
    checks: Vec<Box<dyn FnOnce(&[ExportDefinition]) -> Result<()> + Send>>,
    error: Option<String>,
    _part: PhantomData<fn() -> P>,
}

impl<P: Send + Sync + 'static> PartBuilder<P> {
    /// Start a part whose instances are built by `factory`. The factory receives
    /// the part's declared imports, already resolved.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&Imports) -> Result<P> + Send + Sync + 'static,
    {
        let factory: PartFactory =
            Arc::new(move |imports: &Imports| factory(imports).map(|p| Arc::new(p) as PartInstance));
        Self {
            name: type_name::<P>().to_string(),
            policy: CreationPolicy::default(),
            exports: Vec::new(),
            imports: Vec::new(),
            factory,
            checks: Vec::new(),
            error: None,
            _part: PhantomData,
        }
    }

    /// Part constructed with `P::default()` and no imports.
    pub fn from_default() -> Self
    where
        P: Default,
    {
        Self::new(|_| Ok(P::default()))
    }

    /// Override the display name (defaults to the type name of `P`).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn creation_policy(mut self, policy: CreationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Export the part as `T` under the default contract for `T`.
    pub fn export<T>(self, cast: impl Fn(Arc<P>) -> Arc<T> + Send + Sync + 'static) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.export_as(Contract::of::<T>(), cast)
    }

    /// Export the part as `T` under an explicit contract name.
    pub fn export_named<T>(
        self,
        contract_name: impl Into<String>,
        cast: impl Fn(Arc<P>) -> Arc<T> + Send + Sync + 'static,
    ) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.export_as(Contract::named::<T>(contract_name), cast)
    }

    /// Export the concrete part type itself.
    pub fn export_self(self) -> Self {
        self.export::<P>(|p| p)
    }

    fn export_as<T, F>(mut self, contract: Contract, cast: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<P>) -> Arc<T> + Send + Sync + 'static,
    {
        if self.exports.iter().any(|e| e.contract == contract) {
            self.error
                .get_or_insert_with(|| format!("contract '{}' is exported twice", contract));
        }
        let accessor: ExportAccessor = Arc::new(move |instance: &PartInstance| {
            Arc::clone(instance)
                .downcast::<P>()
                .ok()
                .map(|part| Arc::new(cast(part)) as ErasedValue)
        });
        self.exports.push(ExportDefinition {
            contract,
            metadata: Metadata::new(),
            accessor,
        });
        self
    }

    /// Attach a metadata entry to the most recently declared export.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        match self.exports.last_mut() {
            Some(export) => {
                export.metadata = std::mem::take(&mut export.metadata).with(key, value);
            }
            None => {
                self.error
                    .get_or_insert_with(|| "metadata declared before any export".to_string());
            }
        }
        self
    }

    /// Require the most recently declared export's metadata to convert into
    /// `M`. Checked when the part is built.
    pub fn expect_metadata<M: MetadataView>(mut self) -> Self {
        let Some(index) = self.exports.len().checked_sub(1) else {
            self.error
                .get_or_insert_with(|| "metadata view declared before any export".to_string());
            return self;
        };
        self.checks.push(Box::new(move |exports: &[ExportDefinition]| {
            exports[index].metadata.view::<M>().map(|_| ()).map_err(CompositionError::from)
        }));
        self
    }

    /// Declare an import the factory will read from [`Imports`].
    pub fn import(mut self, import: ImportDefinition) -> Self {
        self.imports.push(import);
        self
    }

    pub fn build(self) -> Result<PartDefinition> {
        if let Some(message) = self.error {
            return Err(CompositionError::InvalidPart {
                part: self.name,
                message,
            });
        }
        for check in self.checks {
            check(&self.exports)?;
        }
        Ok(PartDefinition {
            id: PartId::next(),
            name: self.name,
            policy: self.policy,
            exports: self.exports,
            imports: self.imports,
            factory: self.factory,
            origin: None,
        })
    }
}
