//! Logging prelude module for convenient access to tracing macros.
//!
//! Re-exports the tracing macros used across the crate so modules can pull
//! them in with a single `use crate::logging::*;`.

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// Logs at INFO level and above by default. Control the log level with the
/// `RUST_LOG` environment variable:
///
/// ```bash
/// RUST_LOG=debug cargo run
/// RUST_LOG=deployr=trace cargo run
/// RUST_LOG=deployr::manager=debug,deployr::transfer=trace cargo run
/// ```
pub fn init_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();
}
