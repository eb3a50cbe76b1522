//! Tracing subscriber setup from [`LoggingConfig`].

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Install the global subscriber. `verbosity` comes from repeated `-v` flags
/// and tightens the default filter; an explicit `RUST_LOG` wins over both.
///
/// Safe to call more than once (later calls are no-ops), so tests can
/// initialize freely.
pub fn init(verbosity: u8, logging: &LoggingConfig) {
    let directive = match verbosity {
        0 => logging.filter.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match logging.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    // Already-initialized is fine: tests and embedding callers may have set
    // their own subscriber.
    let _ = result;
}
