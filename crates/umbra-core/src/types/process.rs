//! Process identity and pointer-width types.

use std::fmt;

/// Process identifier (PID)
///
/// Wraps the host debugger's process id. The native module takes a signed
/// 32-bit integer, see [`ProcessId::as_native`].
///
/// ## Example
///
/// ```rust
/// use umbra_core::types::ProcessId;
///
/// let pid = ProcessId::from(4242);
/// assert_eq!(pid.as_native(), 4242);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub u32);

impl ProcessId
{
    /// Value handed across the native boundary.
    ///
    /// The native call surface declares the pid as `int`; the bits are passed
    /// through unchanged.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn as_native(self) -> i32
    {
        self.0 as i32
    }
}

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Pointer width of a process (the debuggee or the host itself).
///
/// The host picks the native module variant by its *own* width; debuggee
/// widths are only recorded for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerWidth
{
    /// 32-bit process (x86)
    Bits32,
    /// 64-bit process (x64)
    Bits64,
}

impl PointerWidth
{
    /// Width of the current (host) process.
    #[must_use]
    pub const fn host() -> Self
    {
        if cfg!(target_pointer_width = "32") {
            PointerWidth::Bits32
        } else {
            PointerWidth::Bits64
        }
    }

    /// Convert a pointer size in bytes, as debuggers usually report it.
    ///
    /// ```rust
    /// use umbra_core::types::PointerWidth;
    ///
    /// assert_eq!(PointerWidth::from_pointer_size(8), Some(PointerWidth::Bits64));
    /// assert_eq!(PointerWidth::from_pointer_size(2), None);
    /// ```
    #[must_use]
    pub const fn from_pointer_size(bytes: u32) -> Option<Self>
    {
        match bytes {
            4 => Some(PointerWidth::Bits32),
            8 => Some(PointerWidth::Bits64),
            _ => None,
        }
    }

    /// Pointer size in bytes.
    #[must_use]
    pub const fn pointer_size(self) -> u32
    {
        match self {
            PointerWidth::Bits32 => 4,
            PointerWidth::Bits64 => 8,
        }
    }

    /// Architecture tag appended to the native module's file stem.
    #[must_use]
    pub const fn module_suffix(self) -> &'static str
    {
        match self {
            PointerWidth::Bits32 => "x86",
            PointerWidth::Bits64 => "x64",
        }
    }
}

impl fmt::Display for PointerWidth
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.module_suffix())
    }
}

/// A process as listed in the host debugger's snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedProcess
{
    /// Host-assigned process id
    pub pid: ProcessId,
    /// Pointer width, when the host knows it
    pub pointer_width: Option<PointerWidth>,
}

impl TrackedProcess
{
    /// Create a snapshot entry.
    #[must_use]
    pub const fn new(pid: ProcessId, pointer_width: Option<PointerWidth>) -> Self
    {
        Self { pid, pointer_width }
    }
}
