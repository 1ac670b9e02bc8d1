pub mod fake_driver;
pub mod fake_pbs;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Uses `with_test_writer()`, so output is captured per-test and the Rust
/// test harness only prints it for failing tests (unless run with
/// `-- --nocapture`). Levels come from `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout, so a lost event hangs no test.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}
