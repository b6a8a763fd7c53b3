//! Loading plugin modules.
//!
//! A module is a dynamic library exporting two symbols, both generated by
//! [`export_module!`](crate::export_module):
//!
//! - `_mosaic_api_version`: returns the core API version the module was built
//!   against, as a C string.
//! - `_mosaic_plugin_register`: receives a [`ModuleRegistrar`] and registers
//!   the module's parts. Returns zero on success.
//!
//! A library is never closed once it loaded. Values handed out by its parts
//! carry its code and vtables and may outlive every host, set and registry.
use std::any::Any;
use std::ffi::{CStr, c_char, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use libloading::{Library, Symbol};

use crate::composition::catalog::{Catalog, TypeCatalog};
use crate::composition::error::CompositionError;
use crate::composition::part::PartDefinition;
use crate::config::CompositionConfig;
use crate::kernel::constants;
use crate::plugin_system::binary;
use crate::plugin_system::error::ModuleLoadError;
use crate::plugin_system::version::VersionRange;
use crate::utils::lock;

type ApiVersionFn = extern "C" fn() -> *const c_char;
type RegisterFn = unsafe extern "C-unwind" fn(*mut c_void) -> i32;

/// Turns candidate files into catalogs.
pub trait ModuleLoader: Send + Sync {
    /// Whether `path` should be offered to [`load`](Self::load) at all.
    fn is_candidate(&self, path: &Path) -> bool;

    /// Load the module at `path` and return the parts it registers.
    fn load(&self, path: &Path) -> Result<Arc<dyn Catalog>, ModuleLoadError>;
}

// Every module that loaded in this process, kept until exit.
static RESIDENT_MODULES: Mutex<Vec<Arc<LoadedModule>>> = Mutex::new(Vec::new());

/// Modules loaded so far by any [`DylibModuleLoader`] in this process.
pub fn resident_modules() -> Vec<Arc<LoadedModule>> {
    lock(&RESIDENT_MODULES).clone()
}

/// An opened module library. It stays open until the process exits.
pub struct LoadedModule {
    path: PathBuf,
    api_version: String,
    _library: Library,
}

impl LoadedModule {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// API version the module reported.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("path", &self.path)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

/// Collects the parts a module registers.
#[derive(Default)]
pub struct ModuleRegistrar {
    parts: Vec<PartDefinition>,
    errors: Vec<String>,
}

impl ModuleRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, part: PartDefinition) {
        self.parts.push(part);
    }

    /// Register the result of a part builder, recording any build failure.
    pub fn register_built(&mut self, part: Result<PartDefinition, CompositionError>) {
        match part {
            Ok(part) => self.register(part),
            Err(e) => self.record_error(e.to_string()),
        }
    }

    /// Note a failure inside the module's registration function.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn into_parts(self) -> Vec<PartDefinition> {
        self.parts
    }
}

/// Loads modules as native dynamic libraries.
#[derive(Debug, Clone)]
pub struct DylibModuleLoader {
    config: CompositionConfig,
    requirement: Option<VersionRange>,
}

impl DylibModuleLoader {
    /// Loader following the extension, cache-file and API settings of `config`.
    ///
    /// An unparsable API requirement makes every module fail the version check.
    pub fn from_config(config: &CompositionConfig) -> Self {
        let requirement = match VersionRange::parse(&config.api_requirement) {
            Ok(range) => Some(range),
            Err(e) => {
                log::warn!("Ignoring API requirement: {}", e);
                None
            }
        };
        Self {
            config: config.clone(),
            requirement,
        }
    }

    fn check_api_version(&self, path: &Path, library: &Library) -> Result<String, ModuleLoadError> {
        let symbol: Symbol<ApiVersionFn> =
            unsafe { library.get(constants::MODULE_API_VERSION_SYMBOL) }.map_err(|source| {
                ModuleLoadError::MissingSymbol {
                    path: path.to_path_buf(),
                    symbol: symbol_name(constants::MODULE_API_VERSION_SYMBOL),
                    source,
                }
            })?;
        let raw = symbol();
        let found = if raw.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned()
        };

        let accepted = self
            .requirement
            .as_ref()
            .is_some_and(|range| range.includes_str(&found).unwrap_or(false));
        if !accepted {
            return Err(ModuleLoadError::ApiVersion {
                path: path.to_path_buf(),
                found,
                required: self.config.api_requirement.clone(),
            });
        }
        Ok(found)
    }

    fn register(&self, path: &Path, library: &Library) -> Result<Vec<PartDefinition>, ModuleLoadError> {
        let register: Symbol<RegisterFn> =
            unsafe { library.get(constants::MODULE_REGISTER_SYMBOL) }.map_err(|source| {
                ModuleLoadError::MissingSymbol {
                    path: path.to_path_buf(),
                    symbol: symbol_name(constants::MODULE_REGISTER_SYMBOL),
                    source,
                }
            })?;
        let register = *register;

        let mut registrar = ModuleRegistrar::new();
        let registrar_ptr = &mut registrar as *mut ModuleRegistrar as *mut c_void;
        let status = panic::catch_unwind(AssertUnwindSafe(move || unsafe { register(registrar_ptr) }))
            .map_err(|payload| ModuleLoadError::Panicked {
                path: path.to_path_buf(),
                message: panic_message(payload.as_ref()),
            })?;

        if status != 0 || !registrar.errors().is_empty() {
            let message = if registrar.errors().is_empty() {
                format!("registration returned status {}", status)
            } else {
                registrar.errors().join("; ")
            };
            return Err(ModuleLoadError::Registration {
                path: path.to_path_buf(),
                message,
            });
        }
        Ok(registrar.into_parts())
    }
}

impl ModuleLoader for DylibModuleLoader {
    fn is_candidate(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if self.config.skip_cache_files && name.contains(constants::CACHE_FILE_MARKER) {
            return false;
        }
        self.config.is_module_extension(path)
    }

    fn load(&self, path: &Path) -> Result<Arc<dyn Catalog>, ModuleLoadError> {
        binary::inspect_file(path)?.check_loadable(path)?;

        let library = unsafe { Library::new(path) }.map_err(|source| ModuleLoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let api_version = self.check_api_version(path, &library)?;
        let parts = self.register(path, &library)?;

        let module = Arc::new(LoadedModule {
            path: path.to_path_buf(),
            api_version,
            _library: library,
        });
        lock(&RESIDENT_MODULES).push(Arc::clone(&module));
        let catalog = TypeCatalog::new(
            parts
                .into_iter()
                .map(|part| part.with_origin(Arc::clone(&module))),
        );
        log::debug!(
            "Loaded module '{}' (API {}) with {} parts",
            path.display(),
            module.api_version(),
            catalog.len()
        );
        Ok(Arc::new(catalog))
    }
}

fn symbol_name(symbol: &[u8]) -> String {
    String::from_utf8_lossy(symbol.strip_suffix(b"\0").unwrap_or(symbol)).into_owned()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic reason".to_string()
    }
}

/// Generate the entry symbols of a plugin module.
///
/// `$register` is a function `fn(&mut ModuleRegistrar) -> Result<(), E>` with
/// `E: Display`.
///
/// ```ignore
/// fn register(registrar: &mut ModuleRegistrar) -> Result<(), CompositionError> {
///     registrar.register(PartBuilder::<MyPart>::from_default().export_self().build()?);
///     Ok(())
/// }
///
/// mosaic_core::export_module!(register);
/// ```
#[macro_export]
macro_rules! export_module {
    ($register:path) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn _mosaic_api_version() -> *const ::std::ffi::c_char {
            $crate::kernel::constants::API_VERSION_CSTR.as_ptr()
        }

        /// # Safety
        ///
        /// `registrar` must point to a live `ModuleRegistrar` owned by the caller.
        #[unsafe(no_mangle)]
        pub unsafe extern "C-unwind" fn _mosaic_plugin_register(
            registrar: *mut ::std::ffi::c_void,
        ) -> i32 {
            if registrar.is_null() {
                return -1;
            }
            let registrar =
                unsafe { &mut *(registrar as *mut $crate::plugin_system::ModuleRegistrar) };
            match $register(registrar) {
                Ok(()) => 0,
                Err(e) => {
                    registrar.record_error(e.to_string());
                    1
                }
            }
        }
    };
}
