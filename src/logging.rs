//! Log subscriber setup for embedders.
//!
//! The engine logs through the `log` macros; this installs a tracing
//! subscriber (with the log bridge) so those records reach stderr with an
//! `RUST_LOG`-style filter. Embedders with their own subscriber skip this.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `filter` is an env-filter directive,
/// e.g. `"info"` or `"skiff=debug,skiff_ftp=trace"`. Calling it twice is
/// harmless; the second call is ignored.
pub fn init(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));
    let result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init();
    if result.is_ok() {
        tracing::info!("logging initialised");
    }
}
