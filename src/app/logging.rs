//! Logging configuration and initialization
//!
//! This module handles tracing setup for programs built on the runtime.

use crate::app::config::RuntimeConfig;
use tracing::debug;

/// Initialize tracing for the process
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logging(config: &RuntimeConfig) {
    let log_level = config.log_level();

    let installed = tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(config.verbose >= 2) // Show target module for -vv and above
        .with_thread_ids(config.verbose >= 3) // Show thread IDs for -vvv
        .with_line_number(config.verbose >= 3)
        .try_init()
        .is_ok();

    if installed {
        debug!("Effect runtime logging at verbosity level: {}", config.verbose);
    }
}

/// Initialize tracing with just a verbosity level
pub fn init_tracing(verbose: u8) {
    init_logging(&RuntimeConfig::new(verbose));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_repeatable() {
        init_tracing(1);
        init_logging(&RuntimeConfig::new(3));
        tracing::info!("still logging");
    }
}
