//! Loaded native libraries and the typed entry points resolved from them.
//!
//! A [`NativeModule`] owns the OS library handle. Entry points keep the module
//! alive through an `Arc` but never the handle itself: [`NativeModule::release`]
//! frees the library immediately, and every later call through an
//! [`EntryPoint`] fails with [`UmbraError::ModuleReleased`] instead of jumping
//! into unmapped code.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use libloading::Library;
use tracing::{debug, info, warn};

use crate::error::{UmbraError, UmbraResult};

type CachedSymbol = Option<Box<dyn Any + Send + Sync>>;

/// A shared library loaded into the current process.
pub struct NativeModule
{
    name: String,
    path: PathBuf,
    library: RwLock<Option<Library>>,
    /// Every lookup result, hits and misses, keyed by export name.
    symbols: Mutex<HashMap<String, CachedSymbol>>,
}

impl NativeModule
{
    /// Load the library at `path`.
    ///
    /// On Windows the library is loaded with `LOAD_WITH_ALTERED_SEARCH_PATH`,
    /// so its own dependencies are searched for next to it first. Elsewhere it
    /// is opened with `RTLD_NOW | RTLD_LOCAL`.
    ///
    /// ## Errors
    ///
    /// `LoadFailed` carrying the loader error and, on Windows, the
    /// `GetLastError` code.
    pub fn load(name: impl Into<String>, path: impl Into<PathBuf>) -> UmbraResult<Self>
    {
        let name = name.into();
        let path = path.into();

        let library = open_library(&path).map_err(|source| UmbraError::LoadFailed {
            code: os_error_code(&source),
            name: name.clone(),
            source,
        })?;

        info!(module = %name, path = %path.display(), "native module loaded");
        Ok(Self {
            name,
            path,
            library: RwLock::new(Some(library)),
            symbols: Mutex::new(HashMap::new()),
        })
    }

    /// Name the module was requested by.
    #[must_use]
    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// Path handed to the OS loader.
    #[must_use]
    pub fn path(&self) -> &Path
    {
        &self.path
    }

    /// Whether the library handle is still held.
    #[must_use]
    pub fn is_loaded(&self) -> bool
    {
        self.library.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Free the library handle.
    ///
    /// Waits for in-flight entry point calls to return. Returns `true` if this
    /// call freed the handle, `false` if it was already released.
    pub fn release(&self) -> bool
    {
        let library = self.library.write().unwrap_or_else(PoisonError::into_inner).take();
        match library {
            Some(library) => {
                if let Err(e) = library.close() {
                    warn!(module = %self.name, error = %e, "failed to close native module");
                }
                info!(module = %self.name, "native module released");
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for NativeModule
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("NativeModule")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

/// Resolve `symbol` from `module` as a callable of type `F`.
///
/// `F` is the export's calling signature, normally an
/// `unsafe extern "C" fn(..)` pointer type. Each export name is looked up at
/// most once: a hit is cached together with its signature, a miss is cached
/// as permanently absent.
///
/// ## Errors
///
/// - `SymbolNotFound` if the export does not exist (now or on an earlier lookup)
/// - `SignatureMismatch` if the name was first bound with a different `F`
/// - `ModuleReleased` if the library has already been freed
pub fn resolve<F>(module: &Arc<NativeModule>, symbol: &str) -> UmbraResult<EntryPoint<F>>
where
    F: Copy + Send + Sync + 'static,
{
    let mut symbols = module.symbols.lock().unwrap_or_else(PoisonError::into_inner);

    if let Some(cached) = symbols.get(symbol) {
        return match cached {
            Some(any) => any
                .downcast_ref::<F>()
                .map(|func| EntryPoint::new(module, symbol, *func))
                .ok_or_else(|| UmbraError::SignatureMismatch {
                    symbol: symbol.to_string(),
                }),
            None => Err(not_found(module, symbol)),
        };
    }

    let library = module.library.read().unwrap_or_else(PoisonError::into_inner);
    let Some(handle) = library.as_ref() else {
        return Err(UmbraError::ModuleReleased(module.name.clone()));
    };

    let mut c_name = Vec::with_capacity(symbol.len() + 1);
    c_name.extend_from_slice(symbol.as_bytes());
    c_name.push(0);

    // SAFETY: the caller names the export's signature through `F`; the value
    // is copied out of the symbol and only called while the library is held.
    let found = unsafe { handle.get::<F>(&c_name) }.map(|sym| *sym);

    match found {
        Ok(func) => {
            debug!(module = %module.name, symbol, "resolved export");
            symbols.insert(symbol.to_string(), Some(Box::new(func)));
            Ok(EntryPoint::new(module, symbol, func))
        }
        Err(e) => {
            warn!(module = %module.name, symbol, error = %e, "export missing");
            symbols.insert(symbol.to_string(), None);
            Err(not_found(module, symbol))
        }
    }
}

fn not_found(module: &NativeModule, symbol: &str) -> UmbraError
{
    UmbraError::SymbolNotFound {
        module: module.name.clone(),
        symbol: symbol.to_string(),
    }
}

/// A named export bound to a fixed signature.
pub struct EntryPoint<F>
{
    module: Arc<NativeModule>,
    symbol: String,
    func: F,
}

impl<F: Copy> EntryPoint<F>
{
    fn new(module: &Arc<NativeModule>, symbol: &str, func: F) -> Self
    {
        Self {
            module: Arc::clone(module),
            symbol: symbol.to_string(),
            func,
        }
    }

    /// Export name.
    #[must_use]
    pub fn symbol(&self) -> &str
    {
        &self.symbol
    }

    /// Module the export was resolved from.
    #[must_use]
    pub fn module(&self) -> &Arc<NativeModule>
    {
        &self.module
    }

    /// Run `call` with the raw function while the library is guaranteed to
    /// stay mapped.
    ///
    /// ## Errors
    ///
    /// `ModuleReleased` if the library was freed; `call` is not run.
    pub fn invoke<R>(&self, call: impl FnOnce(F) -> R) -> UmbraResult<R>
    {
        let library = self.module.library.read().unwrap_or_else(PoisonError::into_inner);
        if library.is_none() {
            return Err(UmbraError::ModuleReleased(self.module.name.clone()));
        }
        Ok(call(self.func))
    }
}

impl<F> fmt::Debug for EntryPoint<F>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("EntryPoint")
            .field("module", &self.module.name)
            .field("symbol", &self.symbol)
            .finish_non_exhaustive()
    }
}

#[cfg(windows)]
fn open_library(path: &Path) -> Result<Library, libloading::Error>
{
    use libloading::os::windows::{Library as WindowsLibrary, LOAD_WITH_ALTERED_SEARCH_PATH};

    // SAFETY: loading runs the module's DllMain; the module is trusted by
    // configuration.
    let library = unsafe { WindowsLibrary::load_with_flags(path, LOAD_WITH_ALTERED_SEARCH_PATH) }?;
    Ok(library.into())
}

#[cfg(unix)]
fn open_library(path: &Path) -> Result<Library, libloading::Error>
{
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};

    // SAFETY: loading runs the library's initializers; the module is trusted
    // by configuration.
    let library = unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL) }?;
    Ok(library.into())
}

/// Platform code carried by a loader error.
///
/// `LoadLibraryExW` failures wrap the `GetLastError` value captured inside
/// libloading; `dlopen` failures only carry a message.
fn os_error_code(error: &libloading::Error) -> Option<i32>
{
    std::error::Error::source(error)
        .and_then(|source| source.downcast_ref::<std::io::Error>())
        .and_then(std::io::Error::raw_os_error)
}
