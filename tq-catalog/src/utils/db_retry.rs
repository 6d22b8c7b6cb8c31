//! Backoff for SQLite lock contention on catalog and session writes

use std::time::{Duration, Instant};
use tq_common::{Error, Result};

/// Run `operation` until it stops hitting a locked database or `max_wait_ms`
/// runs out, then fail with `ConcurrencyConflict`
///
/// Waits start at 10ms and double up to 1s. Every caller runs a whole
/// transaction per attempt, so a failed attempt leaves nothing behind.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let started = Instant::now();
    let budget = Duration::from_millis(max_wait_ms);
    let mut backoff = Duration::from_millis(10);
    let mut attempt = 1u32;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        waited_ms = started.elapsed().as_millis(),
                        "Write went through after lock contention"
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_lock_contention() => err,
            Err(err) => return Err(err),
        };

        let waited = started.elapsed();
        if waited >= budget {
            tracing::error!(
                operation = operation_name,
                attempt,
                waited_ms = waited.as_millis(),
                max_wait_ms,
                error = %err,
                "Giving up on locked database"
            );
            return Err(Error::ConcurrencyConflict(format!(
                "{}: database still locked after {} attempts in {} ms",
                operation_name,
                attempt,
                waited.as_millis()
            )));
        }

        tracing::warn!(
            operation = operation_name,
            attempt,
            backoff_ms = backoff.as_millis(),
            "Database locked, backing off"
        );
        tokio::time::sleep(backoff.min(budget - waited)).await;
        backoff = (backoff * 2).min(Duration::from_secs(1));
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn lock_error() -> Error {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "database is locked");
        Error::Database(sqlx::Error::Io(io))
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let result = retry_on_lock("test_op", 5000, || async { Ok::<i32, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_lock_errors() {
        let attempts = AtomicU32::new(0);

        let result = retry_on_lock("test_op", 5000, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(lock_error())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_with_conflict() {
        let result =
            retry_on_lock("test_op", 50, || async { Err::<i32, Error>(lock_error()) }).await;

        assert!(matches!(result, Err(Error::ConcurrencyConflict(_))));
    }

    #[tokio::test]
    async fn test_non_lock_error_fails_immediately() {
        let attempts = AtomicU32::new(0);

        let result = retry_on_lock("test_op", 5000, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, Error>(Error::NotFound("item".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
