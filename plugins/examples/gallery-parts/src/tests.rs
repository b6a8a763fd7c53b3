use std::ffi::{CStr, c_void};
use std::sync::Arc;

use mosaic_core::composition::{CompositionContainer, ImportDefinition, TypeCatalog};
use mosaic_core::kernel::constants::API_VERSION;

use super::*;

fn container() -> CompositionContainer {
    let mut registrar = ModuleRegistrar::new();
    register(&mut registrar).unwrap();
    CompositionContainer::new(Arc::new(TypeCatalog::new(registrar.into_parts())))
}

#[test]
fn test_register_declares_both_parts() {
    let mut registrar = ModuleRegistrar::new();
    register(&mut registrar).unwrap();
    assert!(registrar.errors().is_empty());

    let parts = registrar.into_parts();
    let names: Vec<&str> = parts.iter().map(|p| p.name()).collect();
    assert_eq!(names, vec![STORE_PART, RENDERER_PART]);
    assert_eq!(parts[0].creation_policy(), CreationPolicy::Shared);
    assert_eq!(parts[1].creation_policy(), CreationPolicy::NonShared);
}

#[test]
fn test_renderers_are_fresh_but_share_the_store() {
    let container = container();
    let first = container.get_exported_value::<dyn ThumbnailRenderer>().unwrap();
    let second = container.get_exported_value::<dyn ThumbnailRenderer>().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.size(), THUMBNAIL_SIZE);
    assert_eq!(
        first.render("holidays"),
        vec!["thumb_128px/beach.jpg", "thumb_128px/sunset.jpg"]
    );
    assert!(second.render("missing").is_empty());
    assert_eq!(container.shared_instance_count(), 1);
}

#[test]
fn test_store_metadata() {
    let container = container();
    let exports = container
        .get_exports(&ImportDefinition::zero_or_more::<dyn AlbumStore>())
        .unwrap();
    assert_eq!(exports.len(), 1);
    let info: StoreInfo = exports[0].metadata().view().unwrap();
    assert_eq!(
        info,
        StoreInfo {
            label: STORE_LABEL.to_string(),
            capacity: ALBUM_CAPACITY,
        }
    );
    let store = exports[0].value_as::<dyn AlbumStore>().unwrap();
    assert_eq!(store.albums(), vec!["holidays", "pets"]);
}

#[test]
fn test_entry_symbols() {
    let version = unsafe { CStr::from_ptr(_mosaic_api_version()) };
    assert_eq!(version.to_str().unwrap(), API_VERSION);

    let mut registrar = ModuleRegistrar::new();
    let status = unsafe { _mosaic_plugin_register(&mut registrar as *mut ModuleRegistrar as *mut c_void) };
    assert_eq!(status, 0);
    assert_eq!(registrar.part_count(), 2);

    assert_eq!(unsafe { _mosaic_plugin_register(std::ptr::null_mut()) }, -1);
}
