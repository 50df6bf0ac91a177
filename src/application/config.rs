use std::time::Duration;

/// Tunables for [`super::LeaveService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Attempts per lifecycle call before a `ConcurrencyConflict` is surfaced
    pub max_attempts: u32,
    /// Base delay between attempts, multiplied by the attempt number
    pub retry_backoff: Duration,
    /// How long SQLite waits on a locked database before giving up
    pub busy_timeout: Duration,
    /// Lifetime of cached report aggregates
    pub cache_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(10),
            busy_timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(300),
        }
    }
}
