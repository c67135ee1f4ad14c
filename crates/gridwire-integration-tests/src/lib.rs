//! Shared setup for the cross-crate scenario tests in `tests/`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a test-friendly subscriber. Honors `RUST_LOG`, defaulting to
/// `warn,gridwire_power=info`. Only the first call in a test binary installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,gridwire_power=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
