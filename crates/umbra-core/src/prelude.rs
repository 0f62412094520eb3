//! Common module for library exports

pub use crate::bridge::{DebugEventBridge, ProcessState};
pub use crate::codes::ProtocolEvent;
pub use crate::config::BridgeSettings;
pub use crate::error::{UmbraError, UmbraResult};
pub use crate::events::{DebugEvent, EventKind};
pub use crate::host::{LifecycleEventSource, LifecycleObserver, ProcessSnapshot, SyntheticHost};
pub use crate::native::{AntiDebugModule, NativeCall, NativeModuleBinder, RecordingModule};
pub use crate::types::{PointerWidth, ProcessId, TrackedProcess};
