//! Bridge configuration.
//!
//! Settings come from code or from `UMBRA_*` environment variables:
//!
//! | Variable              | Field           | Default                  |
//! |-----------------------|-----------------|--------------------------|
//! | `UMBRA_ENABLED`       | `enabled`       | `true`                   |
//! | `UMBRA_MODULE_STEM`   | `module_stem`   | `ScyllaHideDnSpyPlugin`  |
//! | `UMBRA_MODULE_DIR`    | `module_dir`    | unset (OS search order)  |
//! | `UMBRA_LOADER_MODULE` | `loader_module` | `ntdll.dll`              |
//! | `UMBRA_WORKING_DIR`   | `working_dir`   | unset (current dir)      |
//!
//! `enabled` can be flipped at runtime; every event reads the current value.

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{UmbraError, UmbraResult};
use crate::native::binder::NativeModuleBinder;
use crate::types::PointerWidth;

/// Default native module file stem.
pub const DEFAULT_MODULE_STEM: &str = "ScyllaHideDnSpyPlugin";
/// Default system loader module file name.
pub const DEFAULT_LOADER_MODULE: &str = "ntdll.dll";

/// Settings read by the bridge.
#[derive(Debug)]
pub struct BridgeSettings
{
    enabled: AtomicBool,
    /// File stem of the native module, without width suffix or extension
    pub module_stem: String,
    /// Directory the module is loaded from
    pub module_dir: Option<PathBuf>,
    /// File name of the OS loader module
    pub loader_module: String,
    /// Directory passed to the module's init routine
    pub working_dir: Option<PathBuf>,
}

impl Default for BridgeSettings
{
    fn default() -> Self
    {
        Self {
            enabled: AtomicBool::new(true),
            module_stem: DEFAULT_MODULE_STEM.to_string(),
            module_dir: None,
            loader_module: DEFAULT_LOADER_MODULE.to_string(),
            working_dir: None,
        }
    }
}

impl BridgeSettings
{
    /// Read settings from `UMBRA_*` environment variables.
    ///
    /// ## Errors
    ///
    /// `InvalidConfig` if `UMBRA_ENABLED` is not a recognizable boolean.
    pub fn from_env() -> UmbraResult<Self>
    {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    ///
    /// ## Errors
    ///
    /// `InvalidConfig` if `UMBRA_ENABLED` is not a recognizable boolean.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> UmbraResult<Self>
    {
        let mut settings = Self::default();

        if let Some(value) = lookup("UMBRA_ENABLED") {
            settings.set_enabled(parse_flag("UMBRA_ENABLED", &value)?);
        }
        if let Some(stem) = lookup("UMBRA_MODULE_STEM").filter(|s| !s.is_empty()) {
            settings.module_stem = stem;
        }
        if let Some(loader) = lookup("UMBRA_LOADER_MODULE").filter(|s| !s.is_empty()) {
            settings.loader_module = loader;
        }
        settings.module_dir = lookup("UMBRA_MODULE_DIR").filter(|s| !s.is_empty()).map(PathBuf::from);
        settings.working_dir = lookup("UMBRA_WORKING_DIR").filter(|s| !s.is_empty()).map(PathBuf::from);

        Ok(settings)
    }

    /// Builder form of [`BridgeSettings::set_enabled`].
    #[must_use]
    pub fn with_enabled(self, enabled: bool) -> Self
    {
        self.set_enabled(enabled);
        self
    }

    /// Whether the bridge may issue native calls.
    #[must_use]
    pub fn is_enabled(&self) -> bool
    {
        self.enabled.load(Ordering::Acquire)
    }

    /// Turn native calls on or off.
    pub fn set_enabled(&self, enabled: bool)
    {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// File name of the module variant for the host's pointer width.
    #[must_use]
    pub fn library_file_name(&self) -> String
    {
        NativeModuleBinder::library_file_name(&self.module_stem, PointerWidth::host())
    }

    /// Binder matching `module_dir`.
    #[must_use]
    pub fn binder(&self) -> NativeModuleBinder
    {
        match &self.module_dir {
            Some(dir) => NativeModuleBinder::with_search_dir(dir),
            None => NativeModuleBinder::new(),
        }
    }

    /// Whether `file_name` names a dynamic library (`.dll`, any case).
    #[must_use]
    pub fn is_library(&self, file_name: &str) -> bool
    {
        ends_with_ignore_case(file_name, ".dll")
    }

    /// Whether `file_name` is the system loader module, ignoring case.
    #[must_use]
    pub fn is_loader_module(&self, file_name: &str) -> bool
    {
        ends_with_ignore_case(file_name, &self.loader_module)
    }
}

fn ends_with_ignore_case(value: &str, suffix: &str) -> bool
{
    value.len() >= suffix.len()
        && value
            .get(value.len() - suffix.len()..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(suffix))
}

fn parse_flag(key: &str, value: &str) -> UmbraResult<bool>
{
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(UmbraError::InvalidConfig(format!("{key}={other} is not a boolean"))),
    }
}
