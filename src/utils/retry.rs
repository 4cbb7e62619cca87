//! Retry utilities: backoff builders for publish retries and startup connections.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::config::PublishConfig;

/// Backoff for `PublishPIIS` submissions.
///
/// Driven by the `publish` config section; `max_retries = 0` means a
/// single attempt.
pub fn publish_backoff(config: &PublishConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.min_delay_ms))
        .with_max_delay(Duration::from_millis(config.max_delay_ms))
        .with_max_times(config.max_retries)
        .with_jitter()
}

/// Backoff for connecting to the ledger event stream at startup.
///
/// Each dial is bounded by `ledger.connect_timeout_ms`, so a stalled
/// handshake counts as one failed attempt.
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
