//! # Composition Sets
//!
//! A [`CompositionSet`] owns the catalog and root container for one discovery
//! root and is shared by every consumer of that root. The root container holds
//! the one shared instance of each catalog part; host containers defer to it. Consumers hold a
//! [`CompositionSetLock`] while they need the set; hosts created from the set
//! keep it alive too. The set is disposed when the last lock is released and
//! no host remains.
//!
//! Lock order is registry first, then the set's own state. The release path
//! never holds the set state while it takes the registry lock.
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use crate::composition::catalog::{AggregateCatalog, Catalog, CompositionFilter, FilteredCatalog};
use crate::composition::container::{CompositionContainer, ContainerId};
use crate::composition::error::{CompositionError, Result};
use crate::composition::host::CompositionHost;
use crate::composition::registry::{CompositionRegistry, RegistryInner};
use crate::composition::validation::PolicyValidator;
use crate::plugin_system::discovery::DirectoryCatalog;
use crate::utils::lock;

#[derive(Debug, Default)]
struct SetState {
    lock_count: usize,
    active_containers: HashSet<ContainerId>,
    disposed: bool,
}

/// Shared composition state for a single discovery root.
pub struct CompositionSet {
    discovery_root: Option<PathBuf>,
    catalog: Arc<dyn Catalog>,
    // Catalogs handed in by the caller are theirs to dispose.
    owns_catalog: bool,
    root_container: CompositionContainer,
    state: Mutex<SetState>,
    registry: Weak<RegistryInner>,
}

impl CompositionSet {
    pub(crate) fn new(
        discovery_root: Option<PathBuf>,
        catalog: Arc<dyn Catalog>,
        owns_catalog: bool,
        registry: Weak<RegistryInner>,
    ) -> Self {
        let root_container = CompositionContainer::new(Arc::clone(&catalog));
        Self {
            discovery_root,
            catalog,
            owns_catalog,
            root_container,
            state: Mutex::new(SetState::default()),
            registry,
        }
    }

    /// Find the live set for `root` and lock it, or scan `root` and register a
    /// new set. `None` is the unscoped set with an empty catalog.
    ///
    /// The registry lock is not held while scanning; if another caller
    /// registered a set for the same root in the meantime, that set wins.
    pub fn find_or_create(registry: &CompositionRegistry, root: Option<&Path>) -> Result<CompositionSetLock> {
        let inner = registry.inner();
        {
            let sets = lock(&inner.sets);
            if let Some(found) = Self::lock_existing(&sets, root) {
                log::debug!("Reusing composition set for {}", display_root(root));
                return Ok(found);
            }
        }

        let catalog: Arc<dyn Catalog> = match root {
            Some(path) => Arc::new(DirectoryCatalog::scan(path, inner.loader.as_ref(), &inner.config)?),
            None => Arc::new(AggregateCatalog::new()),
        };

        let mut sets = lock(&inner.sets);
        if let Some(found) = Self::lock_existing(&sets, root) {
            drop(sets);
            log::debug!("Composition set for {} was created concurrently", display_root(root));
            catalog.dispose();
            return Ok(found);
        }
        let set = Arc::new(Self::new(
            root.map(Path::to_path_buf),
            catalog,
            true,
            Arc::downgrade(inner),
        ));
        let locked = CompositionSetLock::acquire(Arc::clone(&set))?;
        sets.push(set);
        log::info!("Created composition set for {}", display_root(root));
        Ok(locked)
    }

    fn lock_existing(sets: &[Arc<CompositionSet>], root: Option<&Path>) -> Option<CompositionSetLock> {
        sets.iter()
            .filter(|set| set.discovery_root.as_deref() == root)
            .find_map(|set| CompositionSetLock::acquire(Arc::clone(set)).ok())
    }

    /// The live set whose catalog is `catalog`, if any.
    pub fn find_by_catalog(registry: &CompositionRegistry, catalog: &Arc<dyn Catalog>) -> Option<Arc<CompositionSet>> {
        let sets = lock(&registry.inner().sets);
        sets.iter()
            .find(|set| same_catalog(&set.catalog, catalog) && !set.is_disposed())
            .cloned()
    }

    pub fn discovery_root(&self) -> Option<&Path> {
        self.discovery_root.as_deref()
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn root_container(&self) -> &CompositionContainer {
        &self.root_container
    }

    /// Take a reference on the set. Fails once the set is disposed.
    pub(crate) fn try_lock(&self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.disposed {
            return Err(CompositionError::SetDisposed {
                root: self.discovery_root.clone(),
            });
        }
        state.lock_count += 1;
        Ok(())
    }

    /// Drop a reference taken by [`try_lock`](Self::try_lock).
    pub(crate) fn unlock(&self) {
        let finalize = {
            let mut state = lock(&self.state);
            if state.lock_count == 0 {
                log::warn!(
                    "Unbalanced unlock of composition set for {}",
                    display_root(self.discovery_root())
                );
                return;
            }
            state.lock_count -= 1;
            Self::mark_disposed_if_idle(&mut state)
        };
        if finalize {
            self.finalize();
        }
    }

    /// Create a host whose container sees the set's catalog, narrowed by
    /// `filter` when one is given.
    pub fn create_host(self: &Arc<Self>, filter: Option<Arc<dyn CompositionFilter>>) -> Result<CompositionHost> {
        let registry = self.registry.upgrade();
        let validator = PolicyValidator::new(
            registry
                .as_ref()
                .map(|r| r.config.validation_enabled())
                .unwrap_or(cfg!(debug_assertions)),
        );

        let base: Arc<dyn Catalog> = match filter {
            Some(filter) => Arc::new(FilteredCatalog::new(Arc::clone(&self.catalog), filter)),
            None => Arc::clone(&self.catalog),
        };
        let additions = Arc::new(AggregateCatalog::new());
        let effective: Arc<dyn Catalog> = Arc::new(AggregateCatalog::from_catalogs([
            base,
            Arc::clone(&additions) as Arc<dyn Catalog>,
        ]));
        let container = CompositionContainer::with_parent(effective, &self.root_container);

        {
            let mut state = lock(&self.state);
            if state.disposed {
                return Err(CompositionError::SetDisposed {
                    root: self.discovery_root.clone(),
                });
            }
            state.active_containers.insert(container.id());
        }

        let host = CompositionHost::new(
            container,
            additions,
            Arc::downgrade(self),
            registry.as_ref().map(|r| Arc::downgrade(&r.hosts)),
            validator,
        );
        log::info!(
            "Created host {} for composition set {}",
            host.id(),
            display_root(self.discovery_root())
        );
        Ok(host)
    }

    /// Forget a host container. Disposes the set if it was the last user.
    pub(crate) fn remove_from_set(&self, container: ContainerId) {
        let finalize = {
            let mut state = lock(&self.state);
            if !state.active_containers.remove(&container) {
                return;
            }
            Self::mark_disposed_if_idle(&mut state)
        };
        if finalize {
            self.finalize();
        }
    }

    fn mark_disposed_if_idle(state: &mut SetState) -> bool {
        if state.lock_count == 0 && state.active_containers.is_empty() && !state.disposed {
            state.disposed = true;
            true
        } else {
            false
        }
    }

    /// Tear the set down. Refused while any lock or host still references it;
    /// a set already disposed is left alone.
    pub fn dispose(&self) -> Result<()> {
        {
            let mut state = lock(&self.state);
            if state.disposed {
                return Ok(());
            }
            if state.lock_count > 0 || !state.active_containers.is_empty() {
                return Err(CompositionError::SetInUse {
                    root: self.discovery_root.clone(),
                    locks: state.lock_count,
                    hosts: state.active_containers.len(),
                });
            }
            state.disposed = true;
        }
        self.finalize();
        Ok(())
    }

    /// Tear the set down even if it is still referenced. Used at shutdown.
    pub(crate) fn force_dispose(&self) {
        {
            let mut state = lock(&self.state);
            if state.disposed {
                return;
            }
            if state.lock_count > 0 {
                log::warn!(
                    "Disposing composition set for {} with {} outstanding locks",
                    display_root(self.discovery_root()),
                    state.lock_count
                );
            }
            state.disposed = true;
        }
        self.finalize();
    }

    fn finalize(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_set(self);
        }
        self.root_container.dispose();
        if self.owns_catalog {
            self.catalog.dispose();
        }
        log::info!(
            "Disposed composition set for {}",
            display_root(self.discovery_root())
        );
    }

    pub fn lock_count(&self) -> usize {
        lock(&self.state).lock_count
    }

    pub fn active_host_count(&self) -> usize {
        lock(&self.state).active_containers.len()
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.state).disposed
    }
}

impl std::fmt::Debug for CompositionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("CompositionSet")
            .field("discovery_root", &self.discovery_root)
            .field("lock_count", &state.lock_count)
            .field("active_containers", &state.active_containers.len())
            .field("disposed", &state.disposed)
            .finish_non_exhaustive()
    }
}

/// A reference on a [`CompositionSet`], released on drop.
#[derive(Debug)]
pub struct CompositionSetLock {
    set: Option<Arc<CompositionSet>>,
}

impl CompositionSetLock {
    pub fn acquire(set: Arc<CompositionSet>) -> Result<Self> {
        set.try_lock()?;
        Ok(Self { set: Some(set) })
    }

    pub fn set(&self) -> Option<&Arc<CompositionSet>> {
        self.set.as_ref()
    }

    /// Release the reference now instead of at drop.
    pub fn release(mut self) {
        if let Some(set) = self.set.take() {
            set.unlock();
        }
    }
}

impl Drop for CompositionSetLock {
    fn drop(&mut self) {
        if let Some(set) = self.set.take() {
            set.unlock();
        }
    }
}

pub(crate) fn same_catalog(a: &Arc<dyn Catalog>, b: &Arc<dyn Catalog>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

pub(crate) fn display_root(root: Option<&Path>) -> String {
    root.map(|p| format!("'{}'", p.display()))
        .unwrap_or_else(|| "<unscoped>".to_string())
}
