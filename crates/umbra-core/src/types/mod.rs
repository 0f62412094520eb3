//! # Types
//!
//! Small value types shared by the binder, the event model and the bridge.

pub mod process;

// Re-export all public types
pub use process::{PointerWidth, ProcessId, TrackedProcess};
