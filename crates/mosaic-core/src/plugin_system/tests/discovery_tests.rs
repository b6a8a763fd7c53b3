use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::{TempDir, tempdir};

use crate::composition::catalog::{Catalog, TypeCatalog};
use crate::composition::error::CompositionError;
use crate::composition::part::PartBuilder;
use crate::config::CompositionConfig;
use crate::plugin_system::discovery::DirectoryCatalog;
use crate::plugin_system::error::ModuleLoadError;
use crate::plugin_system::loader::ModuleLoader;

struct Marker;

/// `*.mod` files load as one part each, `*.broken` files fail.
#[derive(Default)]
struct StubLoader {
    loads: AtomicUsize,
}

impl ModuleLoader for StubLoader {
    fn is_candidate(&self, path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("mod") | Some("broken")
        )
    }

    fn load(&self, path: &Path) -> Result<Arc<dyn Catalog>, ModuleLoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if path.extension().is_some_and(|e| e == "broken") {
            return Err(ModuleLoadError::Registration {
                path: path.to_path_buf(),
                message: "broken on purpose".to_string(),
            });
        }
        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("module");
        let part = PartBuilder::<Marker>::new(|_| Ok(Marker))
            .named(name)
            .export_self()
            .build()
            .map_err(|e| ModuleLoadError::Registration {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(Arc::new(TypeCatalog::new([part])))
    }
}

fn layout(files: &[&str]) -> TempDir {
    let dir = tempdir().unwrap();
    for file in files {
        let path = dir.path().join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }
    dir
}

fn part_names(catalog: &DirectoryCatalog) -> Vec<String> {
    let mut names: Vec<String> = catalog.parts().iter().map(|p| p.name().to_string()).collect();
    names.sort();
    names
}

#[test]
fn test_scan_loads_candidates() {
    let dir = layout(&["b.mod", "a.mod", "readme.md", "nested/c.mod"]);
    let loader = StubLoader::default();
    let catalog = DirectoryCatalog::scan(dir.path(), &loader, &CompositionConfig::default()).unwrap();

    assert_eq!(catalog.root(), dir.path());
    assert_eq!(catalog.module_count(), 2);
    assert_eq!(
        catalog.module_paths(),
        vec![dir.path().join("a.mod"), dir.path().join("b.mod")]
    );
    assert_eq!(part_names(&catalog), vec!["a", "b"]);
    assert!(catalog.skipped().is_empty());
}

#[test]
fn test_recursive_scan() {
    let dir = layout(&["a.mod", "nested/c.mod", "nested/deeper/d.mod"]);
    let config = CompositionConfig {
        recursive_scan: true,
        ..Default::default()
    };
    let catalog = DirectoryCatalog::scan(dir.path(), &StubLoader::default(), &config).unwrap();
    assert_eq!(part_names(&catalog), vec!["a", "c", "d"]);
}

#[test]
fn test_failing_modules_are_skipped() {
    let dir = layout(&["a.mod", "z.broken"]);
    let loader = StubLoader::default();
    let catalog = DirectoryCatalog::scan(dir.path(), &loader, &CompositionConfig::default()).unwrap();

    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    assert_eq!(catalog.module_count(), 1);
    assert_eq!(catalog.skipped().len(), 1);
    let skipped = &catalog.skipped()[0];
    assert_eq!(skipped.path, dir.path().join("z.broken"));
    assert!(matches!(skipped.reason, ModuleLoadError::Registration { .. }));
    assert_eq!(skipped.reason.path(), skipped.path.as_path());
}

#[test]
fn test_cache_files_are_ignored() {
    let dir = layout(&["a.mod", "a.cache.mod"]);

    let loader = StubLoader::default();
    let catalog = DirectoryCatalog::scan(dir.path(), &loader, &CompositionConfig::default()).unwrap();
    assert_eq!(catalog.module_count(), 1);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

    let config = CompositionConfig {
        skip_cache_files: false,
        ..Default::default()
    };
    let catalog = DirectoryCatalog::scan(dir.path(), &StubLoader::default(), &config).unwrap();
    assert_eq!(catalog.module_count(), 2);
}

#[test]
fn test_missing_root() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nowhere");
    match DirectoryCatalog::scan(&missing, &StubLoader::default(), &CompositionConfig::default()) {
        Err(CompositionError::DiscoveryRoot { path, .. }) => assert_eq!(path, missing),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("scanning a missing root succeeded"),
    }
}

#[test]
fn test_dispose_releases_modules() {
    let dir = layout(&["a.mod", "b.mod"]);
    let catalog = DirectoryCatalog::scan(dir.path(), &StubLoader::default(), &CompositionConfig::default()).unwrap();
    assert_eq!(catalog.parts().len(), 2);

    catalog.dispose();
    assert_eq!(catalog.module_count(), 0);
    assert!(catalog.parts().is_empty());
    catalog.dispose();
}
