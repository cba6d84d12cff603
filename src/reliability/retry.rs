//! Exponential backoff for store connections.
//!
//! A Redis server that is still starting, loading its dataset or failing
//! over refuses work for a moment. Connecting through [`with_backoff`]
//! rides that out instead of failing the first command.
//!
//! ```rust,ignore
//! use relq::reliability::retry::{Backoff, with_backoff};
//!
//! let conn = with_backoff(Backoff::connect(), "redis connect", || async {
//!     client.get_connection_manager().await.map_err(Into::into)
//! })
//! .await?;
//! ```

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::io;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff schedule: `attempts` retries after the first try, with delays
/// doubling from `min_delay` up to `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Backoff {
    /// Schedule used when opening a store connection.
    #[must_use]
    pub const fn connect() -> Self {
        Self {
            attempts: 5,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub const fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    #[must_use]
    pub const fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    fn builder(self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.attempts)
            .with_factor(2.0)
            .with_jitter()
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::connect()
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the schedule
/// runs out. Only errors accepted by [`is_transient`] are retried.
pub async fn with_backoff<F, Fut, T>(backoff: Backoff, what: &str, operation: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0;
    operation
        .retry(backoff.builder())
        .when(is_transient)
        .notify(|err: &anyhow::Error, delay: Duration| {
            attempt += 1;
            warn!(
                what,
                attempt,
                of = backoff.attempts,
                delay_ms = delay.as_millis() as u64,
                error = %format!("{err:#}"),
                "Store unavailable, retrying"
            );
        })
        .await
}

/// Whether an error is worth retrying: the server could not be reached,
/// timed out, or is not ready to serve yet.
pub fn is_transient(error: &anyhow::Error) -> bool {
    for cause in error.chain() {
        #[cfg(feature = "redis")]
        if let Some(err) = cause.downcast_ref::<redis::RedisError>() {
            use redis::ErrorKind;

            let transient = err.is_connection_refusal()
                || err.is_connection_dropped()
                || err.is_timeout()
                || matches!(
                    err.kind(),
                    ErrorKind::BusyLoadingError
                        | ErrorKind::TryAgain
                        | ErrorKind::ClusterDown
                        | ErrorKind::MasterDown
                );
            debug!(transient, kind = ?err.kind(), "Classified store error");
            return transient;
        }

        if let Some(err) = cause.downcast_ref::<io::Error>() {
            return matches!(
                err.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::NotConnected
            );
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> Backoff {
        Backoff::connect().with_min_delay(Duration::from_millis(1))
    }

    fn refused() -> anyhow::Error {
        io::Error::from(io::ErrorKind::ConnectionRefused).into()
    }

    #[test]
    fn test_io_errors() {
        assert!(is_transient(&refused()));
        assert!(is_transient(
            &io::Error::from(io::ErrorKind::TimedOut).into()
        ));
        assert!(!is_transient(
            &io::Error::from(io::ErrorKind::PermissionDenied).into()
        ));
        assert!(!is_transient(&anyhow::anyhow!("invalid url")));
    }

    #[test]
    fn test_cause_behind_context() {
        let err = Err::<(), _>(refused())
            .context("Failed to connect to Redis")
            .unwrap_err();
        assert!(is_transient(&err));
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_redis_errors() {
        let loading: anyhow::Error =
            redis::RedisError::from((redis::ErrorKind::BusyLoadingError, "loading")).into();
        assert!(is_transient(&loading));

        let auth: anyhow::Error =
            redis::RedisError::from((redis::ErrorKind::AuthenticationFailed, "wrongpass")).into();
        assert!(!is_transient(&auth));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));

        let result = with_backoff(fast(), "connect", || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    return Err(refused());
                }
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));

        let result: anyhow::Result<()> = with_backoff(fast().with_attempts(2), "connect", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(refused())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));

        let result: anyhow::Result<()> = with_backoff(fast(), "connect", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("invalid url")
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
