use std::ffi::CStr;

/// Current module API version. Plugin modules embed the version they were built against.
pub const API_VERSION: &str = "0.1.0";

/// Same as [`API_VERSION`], as a C string handed out through the module ABI
pub const API_VERSION_CSTR: &CStr = c"0.1.0";

/// Default requirement a module's API version must satisfy to be loaded
pub const DEFAULT_API_REQUIREMENT: &str = "^0.1";

/// Symbol a module exports to report its API version
pub const MODULE_API_VERSION_SYMBOL: &[u8] = b"_mosaic_api_version\0";

/// Symbol a module exports to register its parts
pub const MODULE_REGISTER_SYMBOL: &[u8] = b"_mosaic_plugin_register\0";

/// Marker inside file names of cached module images, which are never loaded directly
pub const CACHE_FILE_MARKER: &str = ".cache.";
