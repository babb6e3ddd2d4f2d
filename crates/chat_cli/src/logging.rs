//! Tracing bootstrap. Logs go to stderr so streamed replies on stdout stay
//! clean.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn";

/// `RUST_LOG` wins; otherwise only warnings and errors are shown.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
