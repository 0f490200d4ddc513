//! Structured logging initialization shared by all three binaries.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize a `tracing` subscriber with an `EnvFilter`. `verbosity` follows
/// the common `-v`/`-vv` CLI convention: 0 = info, 1 = debug, 2+ = trace,
/// each overridable by `RUST_LOG`.
pub fn init(verbosity: u8, json: bool) {
    let default_directive = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
