//! `tracing` initialization for binaries and tests.

use std::sync::Once;

use tracing_subscriber::fmt;

static INIT: Once = Once::new();

/// Initializes the global tracing subscriber. Idempotent.
pub fn init() {
    INIT.call_once(|| {
        let _ = fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(true)
            .try_init();
    });
}

/// Like [`init`], but routes output through the test writer so `cargo test`
/// captures it per-test.
pub fn init_for_testing() {
    INIT.call_once(|| {
        let _ = fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
    });
}
