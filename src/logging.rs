//! Logging configuration
//!
//! Script logs go through [`crate::reporter::TestingT`]. This is only for
//! the engine's own diagnostics.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing for the CLI, writing to stderr.
///
/// `RUST_LOG` wins when set. Otherwise the default is `tsar=warn`, or
/// `tsar=debug` with `verbose`.
pub fn init_cli(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "tsar=debug,warn" } else { "tsar=warn" })
    });

    // A host test harness may have installed a subscriber already.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .without_time()
                .compact(),
        )
        .try_init();
}
