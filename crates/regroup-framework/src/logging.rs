//! `tracing` subscriber setup

use crate::config::LogSettings;
use crate::error::FrameworkError;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// `RUST_LOG` wins over `settings.filter` when set.
///
/// # Errors
/// Returns [`FrameworkError::Logging`] for a bad filter directive or when a
/// global subscriber is already installed.
pub fn init(settings: &LogSettings) -> Result<(), FrameworkError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.filter)
            .map_err(|e| FrameworkError::Logging(e.to_string()))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true);

    let installed = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| FrameworkError::Logging(e.to_string()))
}
