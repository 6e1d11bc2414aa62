//! Logging initialization shared by every binary.

use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Filter directive for a verbosity level given as a count of `-v` flags.
pub fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "mrlease=info",
        1 => "mrlease=debug",
        2 => "mrlease=trace",
        _ => "trace,h2=debug,hyper=debug,tower=debug",
    }
}

/// Install the global `tracing` subscriber. `RUST_LOG`, when set, wins over
/// the verbosity flag.
pub fn init_logging(verbose: u8) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_thread_ids(verbose >= 3)
        .init();

    debug!("logging initialised at verbosity {}", verbose);
}
