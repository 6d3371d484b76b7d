//! Tracing setup: subscriber installation and span definitions.

pub mod spans;

use tracing_subscriber::EnvFilter;

use hive_core::config::ObservabilityConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level. Returns `false` if a
/// subscriber was already installed, in which case nothing changes.
pub fn init_tracing(config: &ObservabilityConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json_logs {
        builder
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .json()
            .try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
