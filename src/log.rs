//! Logging setup for plantpipe.
//!
//! Library code logs through `tracing` macros; the binary installs a
//! `tracing-subscriber` formatter on stderr once at startup.
//!
//! Levels:
//! - WARN: recoverable surprises (tasks missing from the catalog)
//! - INFO: command-level events
//! - DEBUG: load progress, config resolution
//!
//! Debug mode can be enabled with the `--debug` flag or `PLANTPIPE_DEBUG=1`.
//! `RUST_LOG` overrides the filter entirely when set.

use tracing_subscriber::EnvFilter;

/// Environment variable switching on debug logging.
pub const DEBUG_ENV: &str = "PLANTPIPE_DEBUG";

/// Interpret the value of [`DEBUG_ENV`].
pub fn debug_from_env(value: Option<&str>) -> bool {
    value
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Filter directive used when `RUST_LOG` is not set.
pub fn default_directive(debug: bool) -> &'static str {
    if debug {
        "plantpipe=debug"
    } else {
        "plantpipe=warn"
    }
}

/// Initialize logging with default settings.
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging, honouring `--debug`, [`DEBUG_ENV`] and `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_with_debug(debug: bool) {
    let env_debug = debug_from_env(std::env::var(DEBUG_ENV).ok().as_deref());
    let directive = default_directive(debug || env_debug);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
