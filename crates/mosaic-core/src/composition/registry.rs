//! # Composition Registry
//!
//! Process-wide composition state, owned explicitly by the application: the
//! list of live composition sets, the host manager, the module loader used to
//! scan discovery roots, and the configuration.
//!
//! ```no_run
//! use mosaic_core::composition::CompositionRegistry;
//! use mosaic_core::config::CompositionConfig;
//!
//! let registry = CompositionRegistry::new(CompositionConfig::default());
//! let host = registry.initialize_new(None, Some("plugins".as_ref()))?;
//! println!("{} parts available", host.part_count()?);
//! # Ok::<(), mosaic_core::composition::CompositionError>(())
//! ```
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::composition::catalog::{Catalog, CompositionFilter};
use crate::composition::error::{CompositionError, Result};
use crate::composition::host::CompositionHost;
use crate::composition::host_manager::HostManager;
use crate::composition::set::{CompositionSet, CompositionSetLock, display_root, same_catalog};
use crate::config::CompositionConfig;
use crate::plugin_system::loader::{DylibModuleLoader, ModuleLoader};
use crate::utils::fs::executable_dir;
use crate::utils::lock;

pub(crate) struct RegistryInner {
    pub(crate) sets: Mutex<Vec<Arc<CompositionSet>>>,
    pub(crate) hosts: Arc<HostManager>,
    pub(crate) loader: Arc<dyn ModuleLoader>,
    pub(crate) config: CompositionConfig,
}

impl RegistryInner {
    pub(crate) fn remove_set(&self, set: &CompositionSet) {
        lock(&self.sets).retain(|existing| !std::ptr::eq(Arc::as_ptr(existing), set));
    }
}

/// Owner of all composition sets and hosts for an application.
#[derive(Clone)]
pub struct CompositionRegistry {
    inner: Arc<RegistryInner>,
}

impl CompositionRegistry {
    /// Registry that loads plugin modules as dynamic libraries.
    pub fn new(config: CompositionConfig) -> Self {
        let loader = Arc::new(DylibModuleLoader::from_config(&config));
        Self::with_loader(config, loader)
    }

    /// Registry with a custom module loader.
    pub fn with_loader(config: CompositionConfig, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sets: Mutex::new(Vec::new()),
                hosts: Arc::new(HostManager::new()),
                loader,
                config,
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<RegistryInner> {
        &self.inner
    }

    pub fn config(&self) -> &CompositionConfig {
        &self.inner.config
    }

    pub fn host_manager(&self) -> &HostManager {
        &self.inner.hosts
    }

    /// Create a host over the set for `root`, creating and scanning the set on
    /// first use. Without a root, the configured default component directory
    /// is used, falling back to the directory of the running executable.
    pub fn initialize_new(
        &self,
        filter: Option<Arc<dyn CompositionFilter>>,
        root: Option<&Path>,
    ) -> Result<CompositionHost> {
        let root = match root {
            Some(path) => path.to_path_buf(),
            None => self.default_root(),
        };
        let set_lock = CompositionSet::find_or_create(self, Some(&root))?;
        Self::host_from_lock(set_lock, filter)
    }

    /// Create a host over a caller-provided catalog. Hosts over the same
    /// catalog share one set; the catalog is never disposed by the registry.
    pub fn initialize_with_catalog(
        &self,
        catalog: Arc<dyn Catalog>,
        filter: Option<Arc<dyn CompositionFilter>>,
        root: Option<&Path>,
    ) -> Result<CompositionHost> {
        let set_lock = {
            let mut sets = lock(&self.inner.sets);
            let existing = sets
                .iter()
                .filter(|set| same_catalog(set.catalog(), &catalog))
                .find_map(|set| CompositionSetLock::acquire(Arc::clone(set)).ok());
            match existing {
                Some(found) => found,
                None => {
                    let set = Arc::new(CompositionSet::new(
                        root.map(Path::to_path_buf),
                        catalog,
                        false,
                        Arc::downgrade(&self.inner),
                    ));
                    let locked = CompositionSetLock::acquire(Arc::clone(&set))?;
                    sets.push(set);
                    log::info!("Created composition set over a supplied catalog for {}", display_root(root));
                    locked
                }
            }
        };
        Self::host_from_lock(set_lock, filter)
    }

    // The lock is released only after the host holds its own reference on the set.
    fn host_from_lock(
        set_lock: CompositionSetLock,
        filter: Option<Arc<dyn CompositionFilter>>,
    ) -> Result<CompositionHost> {
        let Some(set) = set_lock.set().cloned() else {
            return Err(CompositionError::SetDisposed { root: None });
        };
        let host = set.create_host(filter)?;
        set_lock.release();
        Ok(host)
    }

    fn default_root(&self) -> PathBuf {
        if let Some(dir) = &self.inner.config.default_component_dir {
            return dir.clone();
        }
        executable_dir().unwrap_or_else(|e| {
            log::warn!("Cannot locate the executable directory ({}); using the working directory", e);
            PathBuf::from(".")
        })
    }

    /// The live set for `root`, if any.
    pub fn find_set(&self, root: Option<&Path>) -> Option<Arc<CompositionSet>> {
        lock(&self.inner.sets)
            .iter()
            .find(|set| set.discovery_root() == root && !set.is_disposed())
            .cloned()
    }

    /// Snapshot of every registered set.
    pub fn sets(&self) -> Vec<Arc<CompositionSet>> {
        lock(&self.inner.sets).clone()
    }

    /// Dispose every live host and set.
    pub fn shutdown(&self) {
        for host in self.inner.hosts.live_hosts() {
            host.dispose();
        }
        let sets = self.sets();
        let count = sets.len();
        for set in sets {
            set.force_dispose();
        }
        log::info!("Composition registry shut down ({} sets disposed)", count);
    }
}

impl std::fmt::Debug for CompositionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sets = lock(&self.inner.sets).len();
        f.debug_struct("CompositionRegistry")
            .field("sets", &sets)
            .field("hosts", &self.inner.hosts)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
