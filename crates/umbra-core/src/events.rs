//! Host debugger lifecycle events.
//!
//! A [`DebugEvent`] is what the host hands the bridge: an immutable record
//! that is consumed per call and then dropped. Events without a process id
//! are host-wide notifications (running state changed, generic messages) and
//! fan out to every process the host is tracking.

use crate::types::{PointerWidth, ProcessId};

/// Kind of lifecycle notification raised by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind
{
    /// A debuggee process was created or attached
    ProcessCreated,
    /// A debuggee process exited
    ProcessExited,
    /// A thread started
    ThreadCreated,
    /// A thread exited
    ThreadExited,
    /// A module (library or executable image) was mapped
    ModuleLoaded,
    /// A module was unmapped
    ModuleUnloaded,
    /// A breakpoint was bound at a known location
    BoundBreakpoint,
    /// Any other host notification
    Message,
}

impl EventKind
{
    /// Parse the short names used by event traces and logs.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self>
    {
        let kind = match name {
            "create" | "process-created" => EventKind::ProcessCreated,
            "exit" | "process-exited" => EventKind::ProcessExited,
            "thread-create" | "thread-created" => EventKind::ThreadCreated,
            "thread-exit" | "thread-exited" => EventKind::ThreadExited,
            "load" | "module-loaded" => EventKind::ModuleLoaded,
            "unload" | "module-unloaded" => EventKind::ModuleUnloaded,
            "bp" | "breakpoint" | "bound-breakpoint" => EventKind::BoundBreakpoint,
            "message" | "msg" => EventKind::Message,
            _ => return None,
        };
        Some(kind)
    }
}

/// Event-specific payload the bridge does not interpret but keeps for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload
{
    /// Address of a bound breakpoint
    Breakpoint
    {
        /// Bound address
        address: u64,
    },
    /// Exception code and address
    Exception
    {
        /// Platform exception code
        code: u32,
        /// Faulting address
        address: u64,
    },
    /// Free-form host message
    Text(String),
}

/// One notification from the host debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugEvent
{
    /// What happened
    pub kind: EventKind,
    /// Target process, or `None` for host-wide notifications
    pub process: Option<ProcessId>,
    /// Module file path for module load/unload events
    pub module_path: Option<String>,
    /// Pointer width of the target process, when the host reports it
    pub pointer_width: Option<PointerWidth>,
    /// Anything else the host attached
    pub payload: Option<EventPayload>,
}

impl DebugEvent
{
    /// Create an event of `kind` scoped to `pid`.
    #[must_use]
    pub const fn new(kind: EventKind, pid: ProcessId) -> Self
    {
        Self {
            kind,
            process: Some(pid),
            module_path: None,
            pointer_width: None,
            payload: None,
        }
    }

    /// A process-created event.
    #[must_use]
    pub fn process_created(pid: ProcessId, pointer_width: Option<PointerWidth>) -> Self
    {
        Self {
            pointer_width,
            ..Self::new(EventKind::ProcessCreated, pid)
        }
    }

    /// A process-exited event.
    #[must_use]
    pub const fn process_exited(pid: ProcessId) -> Self
    {
        Self::new(EventKind::ProcessExited, pid)
    }

    /// A module-loaded event for the module at `path`.
    #[must_use]
    pub fn module_loaded(pid: ProcessId, path: impl Into<String>) -> Self
    {
        Self {
            module_path: Some(path.into()),
            ..Self::new(EventKind::ModuleLoaded, pid)
        }
    }

    /// A module-unloaded event for the module at `path`.
    #[must_use]
    pub fn module_unloaded(pid: ProcessId, path: impl Into<String>) -> Self
    {
        Self {
            module_path: Some(path.into()),
            ..Self::new(EventKind::ModuleUnloaded, pid)
        }
    }

    /// A breakpoint-bound event.
    #[must_use]
    pub const fn bound_breakpoint(pid: ProcessId) -> Self
    {
        Self::new(EventKind::BoundBreakpoint, pid)
    }

    /// A host-wide notification that is not scoped to any process.
    #[must_use]
    pub const fn host_message() -> Self
    {
        Self {
            kind: EventKind::Message,
            process: None,
            module_path: None,
            pointer_width: None,
            payload: None,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: EventPayload) -> Self
    {
        self.payload = Some(payload);
        self
    }

    /// File-name component of [`DebugEvent::module_path`].
    #[must_use]
    pub fn module_file_name(&self) -> Option<&str>
    {
        self.module_path.as_deref().map(file_name)
    }
}

/// Last component of a path, splitting on both `\` and `/`.
///
/// Host paths are Windows paths even when the bridge is exercised elsewhere,
/// so `std::path::Path` is not used here.
///
/// ```rust
/// use umbra_core::events::file_name;
///
/// assert_eq!(file_name(r"C:\Windows\System32\ntdll.dll"), "ntdll.dll");
/// assert_eq!(file_name("/usr/lib/libc.so.6"), "libc.so.6");
/// assert_eq!(file_name("kernel32.dll"), "kernel32.dll");
/// ```
#[must_use]
pub fn file_name(path: &str) -> &str
{
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}
