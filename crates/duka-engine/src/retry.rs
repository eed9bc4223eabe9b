//! # Conflict Retry Loop
//!
//! Every mutation reads row versions and writes with a version
//! precondition. When another writer got there first the transaction rolls
//! back with a retryable [`duka_db::DbError`]; the loop here runs it again with fresh
//! reads, a bounded number of times.
//!
//! ```text
//! ┌──────────┐  Ok        ┌─────────┐
//! │ attempt  │───────────►│ return  │
//! │   n      │            └─────────┘
//! └────┬─────┘
//!      │ StaleVersion / Busy / number collision
//!      ▼
//!  n < max? ── yes ──► sleep (exponential, jittered) ──► attempt n+1
//!      │
//!      no
//!      ▼
//!  EngineError::Conflict { operation, attempts: max }
//! ```
//!
//! Business rule failures and storage errors are never retried.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::{debug, warn};

use duka_db::DbResult;

use crate::error::{EngineError, EngineResult};

/// Upper bound for a single wait between attempts.
const MAX_INTERVAL: Duration = Duration::from_millis(500);

/// Bounded retry policy for optimistic-lock conflicts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Wait before the second attempt.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Runs `attempt` until it succeeds, fails for good, or attempts run out.
    ///
    /// `attempt` must open its own transaction on every call so each run
    /// starts from fresh reads.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let mut delays = self.create_backoff();
        let mut n = 1;

        loop {
            match attempt().await {
                Ok(value) => {
                    if n > 1 {
                        debug!(operation, attempt = n, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() => {
                    if n >= self.max_attempts {
                        warn!(operation, attempts = n, error = %err, "Giving up after conflicts");
                        return Err(EngineError::Conflict {
                            operation: operation.to_string(),
                            attempts: n,
                        });
                    }

                    let wait = delays.next_backoff().unwrap_or(MAX_INTERVAL);
                    warn!(
                        operation,
                        attempt = n,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "Concurrent update detected, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    n += 1;
                }
                Err(err) => return Err(EngineError::from(err)),
            }
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.backoff,
            initial_interval: self.backoff,
            max_interval: MAX_INTERVAL.max(self.backoff),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use duka_core::CoreError;
    use duka_db::DbError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_first_try_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let value = fast(3)
            .run("sale", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, DbError>(7)
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_from_stale_version() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let value = fast(3)
            .run("sale", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DbError::stale("Inventory", "inv-1", 4))
                } else {
                    Ok("committed")
                }
            })
            .await
            .unwrap();
        assert_eq!(value, "committed");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_conflict() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = fast(3)
            .run("dispatch", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(DbError::Busy("database is locked".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Conflict { ref operation, attempts: 3 } if operation == "dispatch"
        ));
        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rules_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = fast(3)
            .run("sale", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(DbError::Rule(CoreError::MissingCreditCustomerInfo))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Rule(CoreError::MissingCreditCustomerInfo)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_number_collision_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        fast(2)
            .run("sale", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(DbError::duplicate("sales.receipt_number", "RCP-20260101-000001"))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
