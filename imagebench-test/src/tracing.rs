//! Logging for tests.

use tracing_subscriber::EnvFilter;

/// Directives used unless `RUST_LOG` is set: benchmark crates at `DEBUG`, everything else quiet.
const DEFAULT_DIRECTIVES: &str = "WARN,imagebench=DEBUG,imagebench_test=DEBUG";

/// Installs a subscriber writing to the output captured by the test harness.
///
/// Calling this more than once is fine, later calls are no-ops.
///
/// ```
/// imagebench_test::tracing::init();
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}
