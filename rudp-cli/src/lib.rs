//! RUDP CLI Library
//!
//! Shared functionality for the RUDP echo tools.

pub mod config;
pub mod stats;

pub use config::{ClientConfig, Config, ConfigError, ServerConfig};
pub use stats::{
    confirmation_rate, display_compact_stats, display_peer_stats, format_bytes, format_duration,
};

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber; `RUST_LOG` wins over the verbosity flag
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
