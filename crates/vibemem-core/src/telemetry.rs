//! Log output for the `vibemem` command.
//!
//! Store, sync and extraction code emit `event = "..."` records through
//! [`crate::obs`]. This module decides where they go: stderr, as text or
//! JSON lines, so memory artifacts and `context` output printed on stdout
//! can be piped without log noise mixed in.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Verbosity for the CLI flags: `--verbose` shows debug records, otherwise
/// only warnings (fallback tokenizers, rebuilt aggregates, failed syncs).
pub fn level_for(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::WARN
    }
}

/// Install the process-wide subscriber.
///
/// `RUST_LOG` overrides `level` when set, e.g. `RUST_LOG=vibemem_core=trace`.
/// A subscriber installed earlier (by a test harness, say) is left alone.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let json_layer = json.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
    });
    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .ok();
}
