//! Tracing subscriber setup for embedding surfaces.

use tracing_subscriber::{EnvFilter, fmt};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise verbosity maps 0/1/2+ to
/// info/debug/trace for the vidlore crates. Call once at startup; a second
/// call panics in the subscriber, so hosts embedding vidlore alongside their
/// own tracing setup should skip this.
pub fn init_tracing(verbosity: u8, format: LogFormat) {
    let filter = match verbosity {
        0 => "vidlore=info",
        1 => "vidlore=debug",
        _ => "vidlore=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}
