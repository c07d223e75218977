//! sentinel-sensor: a minimal network-facing feature sensor
//!
//! Accepts TCP connections one at a time, reads a single bounded chunk from
//! each, and reduces it to a `(hash, length)` feature vector written to
//! stdout as one JSON line:
//!
//! ```text
//! {"v": [<hash>, <length>]}
//! ```
//!
//! Records are flushed immediately for a live downstream reader. The process
//! exits after a fixed number of connections. Logs go to stderr.

mod config;
mod invariant;
mod runtime;
mod vectorizer;

use config::Config;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging; stdout carries records only
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let stats = runtime::run().inspect_err(|e| error!(error = %e, "Sensor failed"))?;

    info!(
        accepted = stats.accepted,
        emitted = stats.emitted,
        skipped = stats.skipped,
        accept_failures = stats.accept_failures,
        "Sensor shutting down"
    );
    Ok(())
}
