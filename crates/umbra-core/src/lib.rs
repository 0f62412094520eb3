//! # umbra-core
//!
//! Drives a native anti-anti-debug module from a host debugger's lifecycle
//! notifications.
//!
//! Two pieces do the work:
//!
//! - [`native`] loads the module, resolves its exports into typed entry
//!   points, and releases it at teardown.
//! - [`bridge`] observes host events and issues the ordered per-process call
//!   sequence the module expects (init once, create before anything else,
//!   loader flag on the system loader's load, heartbeat for the rest).
//!
//! [`codes`] holds the integer protocol, [`events`] the host event model, and
//! [`host`] the capabilities the bridge needs from a debugger, plus an
//! in-memory implementation of them.
//!
//! ## Why unsafe code is needed
//!
//! Loading a library and calling through a resolved function pointer cannot
//! be checked by the compiler. The unsafe blocks live in [`native`] only and
//! are wrapped in calls that refuse to run once the library is released.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use umbra_core::prelude::*;
//!
//! let host = SyntheticHost::new();
//! let module = Arc::new(RecordingModule::new());
//! let bridge = Arc::new(DebugEventBridge::with_module(
//!     Arc::new(BridgeSettings::default()),
//!     host.snapshot(),
//!     module.clone(),
//! ));
//! host.subscribe(bridge);
//!
//! host.emit(&DebugEvent::process_created(ProcessId(10), None));
//! host.emit(&DebugEvent::bound_breakpoint(ProcessId(10)));
//! assert_eq!(module.call_count(), 3); // init, create, breakpoint
//! ```

#![allow(unsafe_code)] // Required for dynamic library loading and FFI calls

pub mod bridge;
pub mod codes;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod native;
pub mod prelude;
pub mod types;

pub use bridge::DebugEventBridge;
// Re-export commonly used types
pub use error::{UmbraError, UmbraResult};
pub use types::{PointerWidth, ProcessId};
