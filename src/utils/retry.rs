//! Retry utilities: backoff builders.
//!
//! Uses `backon` for exponential backoff with jitter. Only startup connection
//! attempts are retried; the broker client itself never retries.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Backoff for broker connection retries at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 30
/// - Jitter enabled
pub fn connection_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
        .with_jitter()
}
