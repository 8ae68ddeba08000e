//! Bootstrap utilities for stocksync binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LOG_ENV_VAR};

/// Initialize tracing with the STOCKSYNC_LOG environment variable.
///
/// Defaults to "info" level if STOCKSYNC_LOG is not set.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
