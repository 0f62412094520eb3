//! # Native Module Binding
//!
//! Everything that touches the shared library:
//!
//! - [`library`]: a loaded library plus typed, cached export lookup
//! - [`binder`]: load-by-name with caching and teardown
//! - [`exports`]: the anti-anti-debug call surface bound to fixed signatures
//! - [`recording`]: a recording stand-in with the same call surface
//!
//! This is the only part of the crate that needs `unsafe`.

pub mod binder;
pub mod exports;
pub mod library;
pub mod recording;

pub use binder::NativeModuleBinder;
pub use exports::{AntiDebugModule, NativeAntiDebugModule};
pub use library::{EntryPoint, NativeModule};
pub use recording::{NativeCall, RecordingModule};
