//! A stand-in module that records calls instead of making them.
//!
//! Used by `umbra replay --dry-run` and by the bridge tests.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::exports::AntiDebugModule;
use crate::codes::ProtocolEvent;
use crate::error::UmbraResult;
use crate::types::ProcessId;

/// One call into the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCall
{
    /// `init(working_dir)`
    Init(PathBuf),
    /// `reset()`
    Reset,
    /// `debugLoop(event, pid, flag_a, flag_b)`
    DebugLoop
    {
        /// Protocol event
        event: ProtocolEvent,
        /// Target process
        pid: ProcessId,
        /// Start address not known yet
        flag_a: bool,
        /// System loader module
        flag_b: bool,
    },
}

impl NativeCall
{
    /// Shorthand for a `DebugLoop` call.
    #[must_use]
    pub const fn debug_loop(event: ProtocolEvent, pid: u32, flag_a: bool, flag_b: bool) -> Self
    {
        NativeCall::DebugLoop {
            event,
            pid: ProcessId(pid),
            flag_a,
            flag_b,
        }
    }
}

impl fmt::Display for NativeCall
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            NativeCall::Init(dir) => write!(f, "init({})", dir.display()),
            NativeCall::Reset => f.write_str("reset()"),
            NativeCall::DebugLoop {
                event,
                pid,
                flag_a,
                flag_b,
            } => write!(f, "debugLoop({event}, {pid}, {flag_a}, {flag_b})"),
        }
    }
}

/// Records every call in order.
#[derive(Debug, Default)]
pub struct RecordingModule
{
    calls: Mutex<Vec<NativeCall>>,
}

impl RecordingModule
{
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Calls made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<NativeCall>
    {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn call_count(&self) -> usize
    {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn record(&self, call: NativeCall)
    {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }
}

impl AntiDebugModule for RecordingModule
{
    fn init(&self, working_dir: &Path) -> UmbraResult<()>
    {
        self.record(NativeCall::Init(working_dir.to_path_buf()));
        Ok(())
    }

    fn reset(&self) -> UmbraResult<()>
    {
        self.record(NativeCall::Reset);
        Ok(())
    }

    fn debug_loop(&self, event: ProtocolEvent, pid: ProcessId, flag_a: bool, flag_b: bool) -> UmbraResult<()>
    {
        self.record(NativeCall::DebugLoop {
            event,
            pid,
            flag_a,
            flag_b,
        });
        Ok(())
    }
}
