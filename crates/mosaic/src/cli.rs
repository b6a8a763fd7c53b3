use std::path::Path;
use std::sync::Arc;

use mosaic_core::composition::{Catalog, CompositionError, CompositionRegistry, PartDefinition};
use mosaic_core::config::CompositionConfig;
use mosaic_core::kernel::{Error, Result};
use mosaic_core::plugin_system::binary::inspect_file;
use mosaic_core::plugin_system::{DirectoryCatalog, DylibModuleLoader, ModuleLoader, resident_modules};
use mosaic_core::utils::fs::list_files;

/// Scan `dir`, compose a host over what loaded and print every part.
pub fn list_parts(dir: &Path, config: CompositionConfig) -> Result<()> {
    let loader = Arc::new(DylibModuleLoader::from_config(&config));
    let catalog = Arc::new(DirectoryCatalog::scan(dir, loader.as_ref(), &config)?);

    for skipped in catalog.skipped() {
        println!("Skipped {}: {}", skipped.path.display(), skipped.reason);
    }

    let registry = CompositionRegistry::with_loader(config, loader);
    let host = registry.initialize_with_catalog(Arc::clone(&catalog) as Arc<dyn Catalog>, None, Some(dir))?;
    let parts = host.parts()?;
    if parts.is_empty() {
        println!("No parts discovered.");
    } else {
        println!("Parts in {} ({} modules):", dir.display(), catalog.module_count());
        for part in &parts {
            print_part(part)?;
        }
    }

    host.dispose();
    registry.shutdown();
    tracing::debug!(modules = resident_modules().len(), "modules stay loaded until exit");
    Ok(())
}

fn print_part(part: &PartDefinition) -> Result<()> {
    println!("  - {} [{:?}]", part.name(), part.creation_policy());
    if let Some(module) = part.origin() {
        println!("    module: {} (API {})", module.path().display(), module.api_version());
    }
    for export in part.exports() {
        println!("    exports: {}", export.contract());
        if !export.metadata().is_empty() {
            let metadata = serde_json::to_string(export.metadata())
                .map_err(|e| Error::Other(format!("Cannot print metadata: {}", e)))?;
            println!("      metadata: {}", metadata);
        }
    }
    for import in part.imports() {
        println!(
            "    imports: {} ({:?}, {:?})",
            import.contract(),
            import.cardinality(),
            import.required_policy()
        );
    }
    Ok(())
}

/// Report format, architecture and loadability of each candidate under `dir`.
pub fn inspect_modules(dir: &Path, config: &CompositionConfig) -> Result<()> {
    let loader = DylibModuleLoader::from_config(config);
    let candidates = list_files(dir, config.recursive_scan, &|path: &Path| loader.is_candidate(path))
        .map_err(|source| CompositionError::DiscoveryRoot {
            path: dir.to_path_buf(),
            source,
        })?;

    if candidates.is_empty() {
        println!("No module candidates in {}.", dir.display());
        return Ok(());
    }
    for path in candidates {
        match inspect_file(&path) {
            Ok(info) => {
                let verdict = match info.check_loadable(&path) {
                    Ok(()) => "loadable".to_string(),
                    Err(e) => format!("incompatible: {}", e),
                };
                println!(
                    "{}: {} [{}] {}",
                    path.display(),
                    info.format,
                    info.architectures.join(", "),
                    verdict
                );
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "header inspection failed");
                println!("{}: {}", path.display(), e);
            }
        }
    }
    Ok(())
}
