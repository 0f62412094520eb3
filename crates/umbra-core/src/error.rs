//! # Error Types
//!
//! Errors raised at the native-module boundary.
//!
//! None of these ever reach the host debugger as a failure: the bridge logs
//! them and disables the feature. They exist so the binder can be used (and
//! tested) on its own, and so diagnostics carry the platform error code.

use thiserror::Error;

use crate::events::EventKind;
use crate::types::ProcessId;

/// Main error type for Umbra operations
///
/// ## Error Categories
///
/// 1. **Binding errors**: LoadFailed, SymbolNotFound, SignatureMismatch, ModuleReleased
/// 2. **Sequencing diagnostics**: UnexpectedEventOrdering
/// 3. **Configuration errors**: InvalidConfig
/// 4. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum UmbraError
{
    /// The native shared library could not be located or loaded
    ///
    /// `code` is the platform error code observed right after the failed
    /// load (`GetLastError` on Windows). Other platforms report the loader's
    /// message through `source` only.
    #[error("Failed to load native module {name}{}: {source}", os_code_suffix(.code))]
    LoadFailed
    {
        /// Library file name or path that was requested
        name: String,
        /// Platform error code, when the platform has one
        code: Option<i32>,
        /// Underlying loader error
        #[source]
        source: libloading::Error,
    },

    /// A required export is missing from an otherwise loaded module
    ///
    /// Usually a version mismatch between the bridge and the module. A
    /// missing symbol is remembered; later requests fail without another
    /// lookup.
    #[error("Symbol {symbol} not found in native module {module}")]
    SymbolNotFound
    {
        /// Module the lookup ran against
        module: String,
        /// Export name
        symbol: String,
    },

    /// An export was requested with a different signature than the one it
    /// was first bound with
    #[error("Symbol {symbol} was already bound with a different signature")]
    SignatureMismatch
    {
        /// Export name
        symbol: String,
    },

    /// The library behind an entry point has been released
    #[error("Native module {0} has been released")]
    ModuleReleased(String),

    /// An event arrived for a process that was never reported created
    ///
    /// Only used for diagnostics; the event is still delivered.
    #[error("Event {kind:?} for process {pid} arrived before its process-created event")]
    UnexpectedEventOrdering
    {
        /// Process the event was scoped to
        pid: ProcessId,
        /// Host event kind
        kind: EventKind,
    },

    /// A configuration value could not be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error (current directory lookup, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn os_code_suffix(code: &Option<i32>) -> String
{
    code.map(|c| format!(" (os error {c})")).unwrap_or_default()
}

/// Convenience type alias for `Result<T, UmbraError>`
///
/// ```rust
/// use umbra_core::error::UmbraResult;
/// fn foo() -> UmbraResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type UmbraResult<T> = std::result::Result<T, UmbraError>;
