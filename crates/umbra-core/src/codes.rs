//! # Protocol Event Codes
//!
//! The native module speaks the Win32 `DEBUG_EVENT` numbering, plus a
//! neutral code `0` meaning "nothing special happened, just tick".
//!
//! | Event                 | Code |
//! |-----------------------|------|
//! | heartbeat (`Other`)   | 0    |
//! | breakpoint            | 1    |
//! | create thread         | 2    |
//! | create process        | 3    |
//! | exit thread           | 4    |
//! | exit process          | 5    |
//! | load dll              | 6    |
//! | unload dll            | 7    |
//! | output debug string   | 8    |
//! | rip                   | 9    |

use std::fmt;

/// Logical event kinds understood by the native module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolEvent
{
    /// A breakpoint/exception stop
    Breakpoint,
    /// A thread was created
    ThreadCreate,
    /// A process was created
    ProcessCreate,
    /// A thread exited
    ThreadExit,
    /// A process exited
    ProcessExit,
    /// A library was mapped
    DllLoad,
    /// A library was unmapped
    DllUnload,
    /// The debuggee wrote a debug string
    OutputDebugString,
    /// RIP (system debugging error) event
    RipEvent,
    /// Anything else; sent as the heartbeat code
    Other,
}

/// Code of the heartbeat call.
pub const HEARTBEAT_CODE: i32 = 0;

impl ProtocolEvent
{
    /// Every kind, in code order.
    pub const ALL: [ProtocolEvent; 10] = [
        ProtocolEvent::Other,
        ProtocolEvent::Breakpoint,
        ProtocolEvent::ThreadCreate,
        ProtocolEvent::ProcessCreate,
        ProtocolEvent::ThreadExit,
        ProtocolEvent::ProcessExit,
        ProtocolEvent::DllLoad,
        ProtocolEvent::DllUnload,
        ProtocolEvent::OutputDebugString,
        ProtocolEvent::RipEvent,
    ];

    /// Integer code sent to the native module.
    ///
    /// ```rust
    /// use umbra_core::codes::ProtocolEvent;
    ///
    /// assert_eq!(ProtocolEvent::ProcessCreate.code(), 3);
    /// assert_eq!(ProtocolEvent::Other.code(), 0);
    /// ```
    #[must_use]
    pub const fn code(self) -> i32
    {
        match self {
            ProtocolEvent::Other => HEARTBEAT_CODE,
            ProtocolEvent::Breakpoint => 1,
            ProtocolEvent::ThreadCreate => 2,
            ProtocolEvent::ProcessCreate => 3,
            ProtocolEvent::ThreadExit => 4,
            ProtocolEvent::ProcessExit => 5,
            ProtocolEvent::DllLoad => 6,
            ProtocolEvent::DllUnload => 7,
            ProtocolEvent::OutputDebugString => 8,
            ProtocolEvent::RipEvent => 9,
        }
    }

    /// Reverse lookup. Unknown codes map to [`ProtocolEvent::Other`].
    #[must_use]
    pub const fn from_code(code: i32) -> Self
    {
        match code {
            1 => ProtocolEvent::Breakpoint,
            2 => ProtocolEvent::ThreadCreate,
            3 => ProtocolEvent::ProcessCreate,
            4 => ProtocolEvent::ThreadExit,
            5 => ProtocolEvent::ProcessExit,
            6 => ProtocolEvent::DllLoad,
            7 => ProtocolEvent::DllUnload,
            8 => ProtocolEvent::OutputDebugString,
            9 => ProtocolEvent::RipEvent,
            _ => ProtocolEvent::Other,
        }
    }

    /// Win32-style name, used in logs and by `umbra codes`.
    #[must_use]
    pub const fn name(self) -> &'static str
    {
        match self {
            ProtocolEvent::Other => "HEARTBEAT",
            ProtocolEvent::Breakpoint => "BREAKPOINT_DEBUG_EVENT",
            ProtocolEvent::ThreadCreate => "CREATE_THREAD_DEBUG_EVENT",
            ProtocolEvent::ProcessCreate => "CREATE_PROCESS_DEBUG_EVENT",
            ProtocolEvent::ThreadExit => "EXIT_THREAD_DEBUG_EVENT",
            ProtocolEvent::ProcessExit => "EXIT_PROCESS_DEBUG_EVENT",
            ProtocolEvent::DllLoad => "LOAD_DLL_DEBUG_EVENT",
            ProtocolEvent::DllUnload => "UNLOAD_DLL_DEBUG_EVENT",
            ProtocolEvent::OutputDebugString => "OUTPUT_DEBUG_STRING_EVENT",
            ProtocolEvent::RipEvent => "RIP_EVENT",
        }
    }
}

/// Free-function form of [`ProtocolEvent::code`].
#[must_use]
pub const fn code_for(kind: ProtocolEvent) -> i32
{
    kind.code()
}

impl fmt::Display for ProtocolEvent
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} ({})", self.name(), self.code())
    }
}
