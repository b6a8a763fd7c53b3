//! Directory-based module discovery.
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::composition::catalog::Catalog;
use crate::composition::error::CompositionError;
use crate::composition::part::PartDefinition;
use crate::config::CompositionConfig;
use crate::kernel::constants;
use crate::plugin_system::error::ModuleLoadError;
use crate::plugin_system::loader::ModuleLoader;
use crate::utils::fs::list_files;
use crate::utils::lock;

/// A candidate module that could not be loaded.
#[derive(Debug)]
pub struct SkippedModule {
    pub path: PathBuf,
    pub reason: ModuleLoadError,
}

struct ModuleCatalog {
    path: PathBuf,
    catalog: Arc<dyn Catalog>,
}

/// Catalog of every module that loaded from a discovery root.
///
/// Modules that fail to load are logged and listed in [`skipped`](Self::skipped);
/// they never fail the scan.
pub struct DirectoryCatalog {
    root: PathBuf,
    modules: Mutex<Vec<ModuleCatalog>>,
    skipped: Vec<SkippedModule>,
}

impl DirectoryCatalog {
    /// Scan `root` for modules. Fails only if `root` itself cannot be read.
    pub fn scan(
        root: &Path,
        loader: &dyn ModuleLoader,
        config: &CompositionConfig,
    ) -> Result<Self, CompositionError> {
        let skip_cache = config.skip_cache_files;
        let candidates = list_files(root, config.recursive_scan, &|path: &Path| {
            if skip_cache && is_cache_file(path) {
                log::debug!("Ignoring cached module image '{}'", path.display());
                return false;
            }
            loader.is_candidate(path)
        })
        .map_err(|source| CompositionError::DiscoveryRoot {
            path: root.to_path_buf(),
            source,
        })?;

        let mut modules = Vec::new();
        let mut skipped = Vec::new();
        for path in candidates {
            match loader.load(&path) {
                Ok(catalog) => modules.push(ModuleCatalog { path, catalog }),
                Err(reason) => {
                    log::warn!("Skipping module: {}", reason);
                    skipped.push(SkippedModule { path, reason });
                }
            }
        }
        log::info!(
            "Scanned '{}': {} modules loaded, {} skipped",
            root.display(),
            modules.len(),
            skipped.len()
        );

        Ok(Self {
            root: root.to_path_buf(),
            modules: Mutex::new(modules),
            skipped,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Paths of the modules that loaded.
    pub fn module_paths(&self) -> Vec<PathBuf> {
        lock(&self.modules).iter().map(|m| m.path.clone()).collect()
    }

    pub fn module_count(&self) -> usize {
        lock(&self.modules).len()
    }

    pub fn skipped(&self) -> &[SkippedModule] {
        &self.skipped
    }
}

impl Catalog for DirectoryCatalog {
    fn parts(&self) -> Vec<Arc<PartDefinition>> {
        let catalogs: Vec<Arc<dyn Catalog>> = lock(&self.modules)
            .iter()
            .map(|m| Arc::clone(&m.catalog))
            .collect();
        catalogs.iter().flat_map(|c| c.parts()).collect()
    }

    fn dispose(&self) {
        let modules = std::mem::take(&mut *lock(&self.modules));
        for module in &modules {
            module.catalog.dispose();
        }
        log::debug!(
            "Released {} modules from '{}'",
            modules.len(),
            self.root.display()
        );
    }
}

impl std::fmt::Debug for DirectoryCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryCatalog")
            .field("root", &self.root)
            .field("modules", &self.module_paths())
            .field("skipped", &self.skipped.len())
            .finish()
    }
}

fn is_cache_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains(constants::CACHE_FILE_MARKER))
}
