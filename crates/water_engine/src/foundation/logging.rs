//! Logging setup
//!
//! Library code only uses the `log` facade; the binary picks the backend.

pub use log::{debug, info, warn, error, trace};

/// Initialize `env_logger`, using `default_filter` when `RUST_LOG` is unset
pub fn init(default_filter: &str) {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    // A second call (tests, embedding) keeps the first logger.
    let _ = env_logger::Builder::from_env(env).format_timestamp_millis().try_init();
}
