// file: src/logging/logger.rs
// version: 1.0.0
// guid: b8e4d721-95fc-4a30-b6d8-1f2c7e93a064

//! Logger initialization and configuration

use crate::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system
///
/// Secrets are never logged; credential values only ever reach the vault and
/// the rendered inventory.
pub fn init_logger(verbose: bool, quiet: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init()
        .map_err(|e| {
            crate::error::BootstrapError::Config(format!("Failed to initialize logger: {}", e))
        })?;

    Ok(())
}
