//! Logging infrastructure
//!
//! Structured logging with tracing; see `logging::init_logging`.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogGuard};
