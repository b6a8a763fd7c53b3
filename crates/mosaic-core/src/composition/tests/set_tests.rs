use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;

use crate::composition::catalog::Catalog;
use crate::composition::error::CompositionError;
use crate::composition::registry::CompositionRegistry;
use crate::composition::set::{CompositionSet, CompositionSetLock};
use crate::composition::part::{CreationPolicy, PartBuilder};
use crate::composition::tests::fixtures::{
    FakeLoader, Greeter, Named, TrackingCatalog, catalog_of, count, counter, greeter_part, validating_config,
};
use crate::config::CompositionConfig;

fn module_dir(files: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for file in files {
        std::fs::write(dir.path().join(file), b"module").unwrap();
    }
    dir
}

fn registry_with(loader: &Arc<FakeLoader>, config: CompositionConfig) -> CompositionRegistry {
    CompositionRegistry::with_loader(config, Arc::clone(loader) as _)
}

fn loads(loader: &FakeLoader) -> usize {
    loader.loads.load(Ordering::SeqCst)
}

#[test]
fn test_same_root_shares_one_set() {
    let dir = module_dir(&["alpha.part", "beta.part"]);
    let loader = Arc::new(FakeLoader::default());
    let registry = registry_with(&loader, validating_config());

    let first = registry.initialize_new(None, Some(dir.path())).unwrap();
    let second = registry.initialize_new(None, Some(dir.path())).unwrap();
    assert_eq!(loads(&loader), 2);
    assert_eq!(registry.sets().len(), 1);

    let set = registry.find_set(Some(dir.path())).unwrap();
    assert_eq!(set.active_host_count(), 2);
    assert_eq!(set.lock_count(), 0);
    assert_eq!(first.part_count().unwrap(), 2);
    assert_eq!(second.get_shared_exported_values::<dyn Greeter>().unwrap().len(), 2);
}

#[test]
fn test_locks_keep_the_set_alive() {
    let dir = module_dir(&["alpha.part"]);
    let loader = Arc::new(FakeLoader::default());
    let registry = registry_with(&loader, validating_config());

    let first = CompositionSet::find_or_create(&registry, Some(dir.path())).unwrap();
    let second = CompositionSet::find_or_create(&registry, Some(dir.path())).unwrap();
    let set = Arc::clone(first.set().unwrap());
    assert!(Arc::ptr_eq(&set, second.set().unwrap()));
    assert_eq!(set.lock_count(), 2);
    assert_eq!(loads(&loader), 1);

    first.release();
    assert!(!set.is_disposed());
    assert!(registry.find_set(Some(dir.path())).is_some());

    drop(second);
    assert!(set.is_disposed());
    assert!(set.root_container().is_disposed());
    assert!(registry.find_set(Some(dir.path())).is_none());
    assert!(registry.sets().is_empty());

    // A new request scans again.
    let _again = CompositionSet::find_or_create(&registry, Some(dir.path())).unwrap();
    assert_eq!(loads(&loader), 2);
}

#[test]
fn test_hosts_keep_the_set_alive() {
    let dir = module_dir(&["alpha.part"]);
    let loader = Arc::new(FakeLoader::default());
    let registry = registry_with(&loader, validating_config());

    let host = registry.initialize_new(None, Some(dir.path())).unwrap();
    let set = registry.find_set(Some(dir.path())).unwrap();
    assert_eq!(set.lock_count(), 0);
    assert!(!set.is_disposed());
    assert!(matches!(
        set.dispose(),
        Err(CompositionError::SetInUse { locks: 0, hosts: 1, .. })
    ));
    assert!(!host.is_disposed());

    let lock = CompositionSetLock::acquire(Arc::clone(&set)).unwrap();
    host.dispose();
    assert!(!set.is_disposed());
    drop(lock);
    assert!(set.is_disposed());
}

#[test]
fn test_unloadable_modules_are_skipped() {
    let dir = module_dir(&["alpha.part", "broken.bad", "notes.txt"]);
    let loader = Arc::new(FakeLoader::default());
    let registry = registry_with(&loader, validating_config());

    let host = registry.initialize_new(None, Some(dir.path())).unwrap();
    assert_eq!(loads(&loader), 2);
    assert_eq!(host.part_count().unwrap(), 1);
    assert_eq!(
        host.get_shared_exported_value::<dyn Greeter>().unwrap().greet(),
        "hello from alpha"
    );
}

#[test]
fn test_missing_root_fails() {
    let dir = module_dir(&[]);
    let missing = dir.path().join("absent");
    let registry = registry_with(&Arc::new(FakeLoader::default()), validating_config());
    assert!(matches!(
        registry.initialize_new(None, Some(&missing)),
        Err(CompositionError::DiscoveryRoot { .. })
    ));
    assert!(registry.sets().is_empty());
}

#[test]
fn test_default_root_from_config() {
    let dir = module_dir(&["alpha.part"]);
    let config = CompositionConfig {
        default_component_dir: Some(dir.path().to_path_buf()),
        ..validating_config()
    };
    let registry = registry_with(&Arc::new(FakeLoader::default()), config);
    let host = registry.initialize_new(None, None).unwrap();
    assert_eq!(host.part_count().unwrap(), 1);
    assert!(registry.find_set(Some(dir.path())).is_some());
}

#[test]
fn test_unbalanced_unlock_is_ignored() {
    let registry = registry_with(&Arc::new(FakeLoader::default()), validating_config());
    let _host = registry
        .initialize_with_catalog(catalog_of(vec![]), None, None)
        .unwrap();
    let set = registry.sets().remove(0);

    set.unlock();
    assert_eq!(set.lock_count(), 0);
    assert!(!set.is_disposed());
}

#[test]
fn test_disposed_set_refuses_locks_and_hosts() {
    let registry = registry_with(&Arc::new(FakeLoader::default()), validating_config());
    let lock = CompositionSet::find_or_create(&registry, None).unwrap();
    let set = Arc::clone(lock.set().unwrap());

    assert!(matches!(
        set.dispose(),
        Err(CompositionError::SetInUse { root: None, locks: 1, hosts: 0 })
    ));
    assert!(!set.is_disposed());

    registry.shutdown();
    assert!(set.is_disposed());
    assert!(set.dispose().is_ok());
    assert!(registry.find_set(None).is_none());
    assert!(matches!(
        CompositionSetLock::acquire(Arc::clone(&set)),
        Err(CompositionError::SetDisposed { root: None })
    ));
    assert!(matches!(
        set.create_host(None),
        Err(CompositionError::SetDisposed { .. })
    ));

    // Releasing a lock on a disposed set is harmless.
    drop(lock);
    assert_eq!(set.lock_count(), 0);
}

#[test]
fn test_supplied_catalog_is_shared_and_never_disposed() {
    let registry = registry_with(&Arc::new(FakeLoader::default()), validating_config());
    let disposed = Arc::new(AtomicUsize::new(0));
    let catalog: Arc<dyn Catalog> = Arc::new(TrackingCatalog {
        inner: catalog_of(vec![]),
        disposed: Arc::clone(&disposed),
    });

    let first = registry
        .initialize_with_catalog(Arc::clone(&catalog), None, Some(Path::new("supplied")))
        .unwrap();
    let second = registry
        .initialize_with_catalog(Arc::clone(&catalog), None, None)
        .unwrap();
    assert_eq!(registry.sets().len(), 1);

    let set = CompositionSet::find_by_catalog(&registry, &catalog).unwrap();
    assert_eq!(set.discovery_root(), Some(Path::new("supplied")));
    assert_eq!(set.active_host_count(), 2);

    drop(first);
    drop(second);
    assert!(set.is_disposed());
    assert!(CompositionSet::find_by_catalog(&registry, &catalog).is_none());
    assert_eq!(disposed.load(Ordering::SeqCst), 0);
}

#[test]
fn test_scanned_catalog_is_disposed_with_the_set() {
    let dir = module_dir(&["alpha.part"]);
    let registry = registry_with(&Arc::new(FakeLoader::default()), validating_config());
    let host = registry.initialize_new(None, Some(dir.path())).unwrap();
    let set = registry.find_set(Some(dir.path())).unwrap();
    assert_eq!(set.catalog().parts().len(), 1);

    drop(host);
    assert!(set.is_disposed());
    assert!(set.catalog().parts().is_empty());
}

#[test]
fn test_shutdown_disposes_everything() {
    let first_dir = module_dir(&["alpha.part"]);
    let second_dir = module_dir(&["beta.part"]);
    let registry = registry_with(&Arc::new(FakeLoader::default()), validating_config());

    let first = registry.initialize_new(None, Some(first_dir.path())).unwrap();
    let second = registry.initialize_new(None, Some(second_dir.path())).unwrap();
    let lock = CompositionSet::find_or_create(&registry, None).unwrap();
    assert_eq!(registry.sets().len(), 3);

    registry.shutdown();
    assert!(first.is_disposed());
    assert!(second.is_disposed());
    assert!(lock.set().unwrap().is_disposed());
    assert!(registry.sets().is_empty());
    assert_eq!(registry.host_manager().host_count(), 0);
}

#[test]
fn test_concurrent_find_or_create_yields_one_set() {
    let dir = module_dir(&["alpha.part", "beta.part"]);
    let registry = registry_with(&Arc::new(FakeLoader::default()), validating_config());

    let locks: Vec<CompositionSetLock> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| CompositionSet::find_or_create(&registry, Some(dir.path())).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(registry.sets().len(), 1);
    let set = registry.find_set(Some(dir.path())).unwrap();
    assert_eq!(set.lock_count(), 8);
    assert!(locks.iter().all(|l| Arc::ptr_eq(l.set().unwrap(), &set)));

    drop(locks);
    assert!(set.is_disposed());
}

#[test]
fn test_unscoped_set() {
    let registry = registry_with(&Arc::new(FakeLoader::default()), validating_config());
    let lock = CompositionSet::find_or_create(&registry, None).unwrap();
    let set = lock.set().unwrap();
    assert_eq!(set.discovery_root(), None);
    assert!(set.catalog().parts().is_empty());
    assert!(Arc::ptr_eq(set, &registry.find_set(None).unwrap()));
}

#[test]
fn test_hosts_of_one_set_share_root_instances() {
    let shared = counter();
    let fresh = counter();
    let fresh_count = Arc::clone(&fresh);
    let catalog = catalog_of(vec![
        greeter_part("shared", CreationPolicy::Shared, Arc::clone(&shared)),
        PartBuilder::<Named>::new(move |_| {
            fresh_count.fetch_add(1, Ordering::SeqCst);
            Ok(Named("fresh".into()))
        })
        .named("fresh")
        .creation_policy(CreationPolicy::NonShared)
        .export_self()
        .build()
        .unwrap(),
    ]);
    let registry = registry_with(&Arc::new(FakeLoader::default()), validating_config());
    let first = registry
        .initialize_with_catalog(Arc::clone(&catalog), None, None)
        .unwrap();
    let second = registry
        .initialize_with_catalog(Arc::clone(&catalog), None, None)
        .unwrap();
    let set = registry.sets().remove(0);

    let a = first.get_shared_exported_value::<dyn Greeter>().unwrap();
    let b = second.get_shared_exported_value::<dyn Greeter>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(count(&shared), 1);
    assert_eq!(set.root_container().shared_instance_count(), 1);
    assert_eq!(first.container().shared_instance_count(), 0);

    let x = first.get_non_shared_exported_value::<Named>().unwrap();
    let y = second.get_non_shared_exported_value::<Named>().unwrap();
    assert!(!Arc::ptr_eq(&x, &y));
    assert_eq!(count(&fresh), 2);

    // The root instance outlives the first host.
    first.dispose();
    let c = second.get_shared_exported_value::<dyn Greeter>().unwrap();
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(count(&shared), 1);
}

#[test]
fn test_host_private_parts_stay_in_the_host() {
    let private = counter();
    let registry = registry_with(&Arc::new(FakeLoader::default()), validating_config());
    let host = registry
        .initialize_with_catalog(catalog_of(vec![]), None, None)
        .unwrap();
    host.add_to_composition(catalog_of(vec![greeter_part(
        "private",
        CreationPolicy::Shared,
        Arc::clone(&private),
    )]))
    .unwrap();
    let set = registry.sets().remove(0);

    let first = host.get_shared_exported_value::<dyn Greeter>().unwrap();
    let second = host.get_shared_exported_value::<dyn Greeter>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(count(&private), 1);
    assert_eq!(host.container().shared_instance_count(), 1);
    assert_eq!(set.root_container().shared_instance_count(), 0);
}
