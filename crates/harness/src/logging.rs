use std::sync::Once;

use tracing_subscriber::EnvFilter;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for the harness (call once at startup).
///
/// Events go to stderr so reports on stdout stay machine-readable.
/// `RUST_LOG` wins when set; otherwise `verbose` enables `debug` for this
/// crate. Without either nothing is installed, and a later call may still
/// install a subscriber.
pub fn init_tracing(verbose: bool) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) if verbose => EnvFilter::new("grammar_conformance=debug,info"),
        Err(_) => return,
    };
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*};

        // A host test runner may already have installed a subscriber.
        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(filter)
            .try_init();
    });
}
