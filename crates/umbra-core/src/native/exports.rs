//! Call surface of the anti-anti-debug module.
//!
//! Both module variants (x86 and x64) export the same three functions with the
//! C calling convention:
//!
//! | Export                | Signature                                         |
//! |-----------------------|---------------------------------------------------|
//! | `ScyllaHideInit`      | `void (const wchar_t *directory)`                 |
//! | `ScyllaHideReset`     | `void (void)`                                     |
//! | `ScyllaHideDebugLoop` | `void (int event, int pid, BOOL flag_a, BOOL flag_b)` |
//!
//! `flag_a` tells the module that the start address is not known yet (set on
//! process creation), `flag_b` marks the system loader module on DLL loads.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use super::binder::NativeModuleBinder;
use super::library::{EntryPoint, NativeModule};
use crate::codes::ProtocolEvent;
use crate::error::{UmbraError, UmbraResult};
use crate::types::ProcessId;

/// Export name of the global init routine.
pub const INIT_EXPORT: &str = "ScyllaHideInit";
/// Export name of the full-state reset routine.
pub const RESET_EXPORT: &str = "ScyllaHideReset";
/// Export name of the per-event routine.
pub const DEBUG_LOOP_EXPORT: &str = "ScyllaHideDebugLoop";

/// Win32 `BOOL`.
pub type Bool32 = i32;

/// `ScyllaHideInit`
pub type InitFn = unsafe extern "C" fn(directory: *const u16);
/// `ScyllaHideReset`
pub type ResetFn = unsafe extern "C" fn();
/// `ScyllaHideDebugLoop`
pub type DebugLoopFn = unsafe extern "C" fn(event: i32, process_id: i32, flag_a: Bool32, flag_b: Bool32);

/// What the bridge needs from an anti-anti-debug module.
///
/// Implemented by [`NativeAntiDebugModule`] for the real library and by
/// [`super::recording::RecordingModule`] for dry runs and tests.
pub trait AntiDebugModule: Send + Sync
{
    /// Global initialization, once per bridge lifetime.
    ///
    /// ## Errors
    ///
    /// Only binding errors; the native routine itself cannot fail.
    fn init(&self, working_dir: &Path) -> UmbraResult<()>;

    /// Reset all module state.
    ///
    /// ## Errors
    ///
    /// `SymbolNotFound` if the module has no reset routine.
    fn reset(&self) -> UmbraResult<()>;

    /// Per-event, per-process call.
    ///
    /// ## Errors
    ///
    /// Only binding errors; the native routine itself cannot fail.
    fn debug_loop(&self, event: ProtocolEvent, pid: ProcessId, flag_a: bool, flag_b: bool) -> UmbraResult<()>;
}

/// The native module with its three exports resolved.
#[derive(Debug)]
pub struct NativeAntiDebugModule
{
    module: Arc<NativeModule>,
    init: EntryPoint<InitFn>,
    reset: Option<EntryPoint<ResetFn>>,
    debug_loop: EntryPoint<DebugLoopFn>,
}

impl NativeAntiDebugModule
{
    /// Resolve the call surface from an already loaded module.
    ///
    /// `ScyllaHideInit` is resolved first and nothing else is looked up when
    /// it is missing. A missing `ScyllaHideReset` is tolerated.
    ///
    /// ## Errors
    ///
    /// `SymbolNotFound` when `ScyllaHideInit` or `ScyllaHideDebugLoop` is missing.
    pub fn bind(binder: &NativeModuleBinder, module: &Arc<NativeModule>) -> UmbraResult<Self>
    {
        let init = binder.resolve::<InitFn>(module, INIT_EXPORT)?;
        let reset = match binder.resolve::<ResetFn>(module, RESET_EXPORT) {
            Ok(reset) => Some(reset),
            Err(e) => {
                warn!(error = %e, "reset routine unavailable");
                None
            }
        };
        let debug_loop = binder.resolve::<DebugLoopFn>(module, DEBUG_LOOP_EXPORT)?;

        debug!(module = module.name(), "call surface bound");
        Ok(Self {
            module: Arc::clone(module),
            init,
            reset,
            debug_loop,
        })
    }

    /// Load the host-width variant of `stem` and bind it.
    ///
    /// ## Errors
    ///
    /// `LoadFailed` or `SymbolNotFound`.
    pub fn load(binder: &NativeModuleBinder, stem: &str) -> UmbraResult<Self>
    {
        let module = binder.load_for_host(stem)?;
        Self::bind(binder, &module)
    }

    /// The underlying library.
    #[must_use]
    pub fn module(&self) -> &Arc<NativeModule>
    {
        &self.module
    }
}

impl AntiDebugModule for NativeAntiDebugModule
{
    fn init(&self, working_dir: &Path) -> UmbraResult<()>
    {
        let directory = to_wide(working_dir);
        // SAFETY: `directory` is NUL-terminated UTF-16 and outlives the call.
        self.init.invoke(|f| unsafe { f(directory.as_ptr()) })
    }

    fn reset(&self) -> UmbraResult<()>
    {
        let Some(reset) = &self.reset else {
            return Err(UmbraError::SymbolNotFound {
                module: self.module.name().to_string(),
                symbol: RESET_EXPORT.to_string(),
            });
        };
        // SAFETY: no arguments.
        reset.invoke(|f| unsafe { f() })
    }

    fn debug_loop(&self, event: ProtocolEvent, pid: ProcessId, flag_a: bool, flag_b: bool) -> UmbraResult<()>
    {
        let code = event.code();
        let pid = pid.as_native();
        // SAFETY: plain integer arguments.
        self.debug_loop
            .invoke(|f| unsafe { f(code, pid, Bool32::from(flag_a), Bool32::from(flag_b)) })
    }
}

/// NUL-terminated UTF-16 form of `path`.
#[must_use]
pub fn to_wide(path: &Path) -> Vec<u16>
{
    #[cfg(windows)]
    let mut wide: Vec<u16> = {
        use std::os::windows::ffi::OsStrExt;
        path.as_os_str().encode_wide().collect()
    };
    #[cfg(not(windows))]
    let mut wide: Vec<u16> = path.to_string_lossy().encode_utf16().collect();

    wide.push(0);
    wide
}
