//! # Umbra Utilities
//!
//! Shared utilities for the Umbra workspace, chiefly the `tracing` logging
//! bootstrap used by the CLI and by hosts embedding the bridge.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_to_file, init_logging_with_level, LogFormat, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
