//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Directive used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info,ember=debug,gpu_allocator=warn";

/// Initialize the logging system with tracing.
///
/// Filtering follows `RUST_LOG` when set. Output carries the target and thread id
/// of each event.
///
/// # Example
/// ```
/// ember_core::init_logging();
/// tracing::info!("Engine started");
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
