//! Diagnostic tracing for the orchestrator.
//!
//! Tracing is for whoever is debugging a run: it goes to stderr, is filtered
//! by `RUST_LOG` and is never persisted. The run journal (`io/journal`) is the
//! product record of a run and is written regardless of the log filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber: `RUST_LOG` filter (default `warn`), compact
/// lines on stderr.
///
/// ```bash
/// RUST_LOG=taskloop=debug taskloop run --objective "write hello.txt"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
