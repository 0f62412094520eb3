//! # Native Module Binder
//!
//! Loads native modules by name, caches them so each name is mapped once,
//! and releases them at teardown.
//!
//! ```rust,no_run
//! use umbra_core::native::binder::NativeModuleBinder;
//! use umbra_core::native::exports::ResetFn;
//!
//! let binder = NativeModuleBinder::new();
//! let module = binder.load_for_host("ScyllaHideDnSpyPlugin")?;
//! let reset = binder.resolve::<ResetFn>(&module, "ScyllaHideReset")?;
//! // SAFETY: ScyllaHideReset takes no arguments.
//! reset.invoke(|f| unsafe { f() })?;
//! binder.release(module.name());
//! # Ok::<(), umbra_core::error::UmbraError>(())
//! ```

use std::collections::HashMap;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::library::{self, EntryPoint, NativeModule};
use crate::error::UmbraResult;
use crate::types::PointerWidth;

/// Loads and caches native modules.
///
/// ## Thread Safety
///
/// All methods take `&self`; loads are serialized so that two threads asking
/// for the same name end up with the same [`NativeModule`].
#[derive(Debug, Default)]
pub struct NativeModuleBinder
{
    search_dir: Option<PathBuf>,
    modules: Mutex<HashMap<String, Arc<NativeModule>>>,
}

impl NativeModuleBinder
{
    /// Binder that lets the OS loader find modules by name.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Binder that loads modules from `dir`.
    ///
    /// The directory is made absolute so that the loader's altered search
    /// order applies to the module's own dependencies.
    #[must_use]
    pub fn with_search_dir(dir: impl Into<PathBuf>) -> Self
    {
        let dir = dir.into();
        let dir = if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir().map_or(dir.clone(), |cwd| cwd.join(&dir))
        };
        Self {
            search_dir: Some(dir),
            modules: Mutex::default(),
        }
    }

    /// Directory modules are loaded from, if any.
    #[must_use]
    pub fn search_dir(&self) -> Option<&Path>
    {
        self.search_dir.as_deref()
    }

    /// Platform file name of the module variant for `width`.
    ///
    /// ```rust
    /// use umbra_core::native::binder::NativeModuleBinder;
    /// use umbra_core::types::PointerWidth;
    ///
    /// let name = NativeModuleBinder::library_file_name("ScyllaHideDnSpyPlugin", PointerWidth::Bits64);
    /// assert!(name.contains("ScyllaHideDnSpyPluginx64"));
    /// ```
    #[must_use]
    pub fn library_file_name(stem: &str, width: PointerWidth) -> String
    {
        format!("{DLL_PREFIX}{stem}{}{DLL_SUFFIX}", width.module_suffix())
    }

    /// Load the variant of `stem` matching the host's pointer width.
    ///
    /// ## Errors
    ///
    /// See [`NativeModuleBinder::load`].
    pub fn load_for_host(&self, stem: &str) -> UmbraResult<Arc<NativeModule>>
    {
        self.load(&Self::library_file_name(stem, PointerWidth::host()))
    }

    /// Load `module_name`, or return the already loaded instance.
    ///
    /// Failed loads are not cached.
    ///
    /// ## Errors
    ///
    /// `LoadFailed` if the OS loader rejects the library.
    pub fn load(&self, module_name: &str) -> UmbraResult<Arc<NativeModule>>
    {
        let mut modules = self.modules.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(module) = modules.get(module_name) {
            debug!(module = module_name, "native module already loaded");
            return Ok(Arc::clone(module));
        }

        let path = self
            .search_dir
            .as_ref()
            .map_or_else(|| PathBuf::from(module_name), |dir| dir.join(module_name));
        let module = Arc::new(NativeModule::load(module_name, path)?);
        modules.insert(module_name.to_string(), Arc::clone(&module));
        Ok(module)
    }

    /// Resolve an export of `module` with signature `F`.
    ///
    /// ## Errors
    ///
    /// See [`library::resolve`].
    pub fn resolve<F>(&self, module: &Arc<NativeModule>, symbol: &str) -> UmbraResult<EntryPoint<F>>
    where
        F: Copy + Send + Sync + 'static,
    {
        library::resolve(module, symbol)
    }

    /// Release `module_name` and drop it from the cache.
    ///
    /// Idempotent. Returns `true` if a library handle was freed.
    pub fn release(&self, module_name: &str) -> bool
    {
        let module = self.modules.lock().unwrap_or_else(PoisonError::into_inner).remove(module_name);
        module.is_some_and(|module| module.release())
    }

    /// Release every cached module.
    pub fn release_all(&self)
    {
        let modules: Vec<_> = self
            .modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, module)| module)
            .collect();
        for module in modules {
            module.release();
        }
    }

    /// Names of the currently cached modules.
    #[must_use]
    pub fn loaded_modules(&self) -> Vec<String>
    {
        let mut names: Vec<_> = self
            .modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl Drop for NativeModuleBinder
{
    fn drop(&mut self)
    {
        self.release_all();
    }
}
