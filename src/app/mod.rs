//! Application module
//!
//! This module contains the runtime-level plumbing around effects:
//! - Configuration handling
//! - Logging setup
//! - Runtime initialization and top-level execution

pub mod config;
pub mod logging;
pub mod runtime;

pub use config::RuntimeConfig;
pub use logging::{init_logging, init_tracing};
pub use runtime::Runtime;
