//! Bounded retry for store access.
//!
//! One policy, parameterized once, applied uniformly wherever the
//! controller touches persistence. Only transient failures are retried;
//! version conflicts are the exactly-once signal and pass straight
//! through.

use std::time::Duration;

use tracing::warn;

use crate::state::{StoreError, StoreResult};

/// Attempts plus exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Backoff before the second attempt; doubles per attempt after that.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Run `op` up to `attempts` times, backing off between transient
    /// failures. Non-transient errors return immediately.
    pub async fn run<T, F>(&self, op_name: &str, mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> StoreResult<T>,
    {
        let mut backoff = self.base_backoff;

        for attempt in 1..=self.attempts {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    warn!(
                        op = op_name,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Transient store failure, retrying: {}",
                        err
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => return Err(err),
            }
        }

        // attempts >= 1, so the loop always returns.
        Err(StoreError::Backend(format!("{}: retry budget exhausted", op_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn first_success_returns_immediately() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result = policy
            .run("get", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result = policy
            .run("put", || {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StoreError::Backend("flaky".into()))
                } else {
                    Ok("done")
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_surfaces_the_last_error() {
        let policy = RetryPolicy {
            attempts: 2,
            base_backoff: Duration::from_millis(10),
        };
        let calls = AtomicU32::new(0);

        let err = policy
            .run::<(), _>("put", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Backend("still down".into()))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn version_conflicts_are_never_retried() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let err = policy
            .run::<(), _>("cas", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::VersionConflict {
                    key: "battle:b1".into(),
                    expected: 1,
                    found: 2,
                })
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, StoreError::VersionConflict { .. }));
    }
}
