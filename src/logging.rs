//! tracing setup: an `EnvFilter` plus a non-blocking writer, following this
//! crate's established logging shape (see the original `logging.rs`) but
//! simplified to a single stdout sink — the flash-sale core has no need for
//! the hourly/daily file rotation the trading side of this repo set up for
//! long-running exchange processes.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the global tracing subscriber. Returns a `WorkerGuard` that
/// must be held for the lifetime of the process (dropping it flushes and
/// stops the non-blocking writer).
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if config.log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(non_blocking),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(non_blocking))
            .init();
    }

    guard
}
