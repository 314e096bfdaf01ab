//! Backend access layer.
//!
//! Every backend call made by a check goes through [`AccessLayer`], which
//! bounds the call with a timeout and retries throttling/unavailability with
//! exponential backoff (or the server's retry-after hint). Retry state lives on
//! the stack of each call, so nothing here is shared between checks.

mod error;

pub use error::{AccessError, BackendError, ErrorKind};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::TenantBackend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(retry_after) = retry_after {
            return retry_after;
        }
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

#[derive(Clone)]
pub struct AccessLayer {
    backend: Arc<dyn TenantBackend>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for AccessLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessLayer")
            .field("backend", &self.backend.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl AccessLayer {
    pub fn new(backend: Arc<dyn TenantBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Calls one backend capability through the retry policy.
    pub async fn call<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, AccessError>
    where
        F: Fn(Arc<dyn TenantBackend>) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        self.invoke_with_retry(operation, || f(Arc::clone(&self.backend)))
            .await
    }

    pub async fn invoke_with_retry<T, F, Fut>(
        &self,
        operation: &str,
        mut work: F,
    ) -> Result<T, AccessError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let outcome = match tokio::time::timeout(self.policy.call_timeout, work()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(BackendError::unavailable(format!(
                    "no response within {:?}",
                    self.policy.call_timeout
                ))),
            };

            let err = match outcome {
                Ok(value) => {
                    debug!(operation, attempts = attempt + 1, "backend call succeeded");
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.kind.is_transient() {
                return Err(AccessError::immediate(operation, err));
            }
            if attempt >= self.policy.max_retries {
                return Err(AccessError::exhausted(operation, err.kind, attempt + 1));
            }

            attempt += 1;
            let delay = self.policy.delay_for(attempt, err.retry_after);
            warn!(
                operation,
                attempt,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                kind = %err.kind,
                server_hint = err.retry_after.is_some(),
                "backend call failed transiently, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SnapshotBackend;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn layer(max_retries: u32) -> AccessLayer {
        AccessLayer::new(
            Arc::new(SnapshotBackend::default()),
            RetryPolicy {
                max_retries,
                ..RetryPolicy::default()
            },
        )
    }

    async fn throttle_n_times(layer: &AccessLayer, n: u32) -> (Result<u32, AccessError>, u32) {
        let calls = AtomicU32::new(0);
        let result = layer
            .invoke_with_retry("test.op", || {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if call <= n {
                        Err(BackendError::throttled("slow down"))
                    } else {
                        Ok(call)
                    }
                }
            })
            .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[test]
    fn delay_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2, None), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3, None), Duration::from_secs(8));
        assert_eq!(
            policy.delay_for(3, Some(Duration::from_secs(1))),
            Duration::from_secs(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_max_retries_times_then_succeeds() {
        let layer = layer(3);
        let started = Instant::now();
        let (result, calls) = throttle_n_times(&layer, 3).await;
        assert_eq!(result, Ok(4));
        assert_eq!(calls, 4);
        assert_eq!(started.elapsed(), Duration::from_secs(2 + 4 + 8));
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_past_max_retries_surfaces_throttled() {
        let layer = layer(3);
        let (result, calls) = throttle_n_times(&layer, 4).await;
        assert_eq!(
            result,
            Err(AccessError::Throttled {
                operation: "test.op".to_string(),
                attempts: 4,
            })
        );
        assert_eq!(calls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn server_retry_after_is_preferred() {
        let layer = layer(3);
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let result = layer
            .invoke_with_retry("test.op", || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        Err(BackendError::throttled("429")
                            .with_retry_after(Duration::from_secs(7)))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_is_not_retried() {
        let layer = layer(3);
        let calls = AtomicU32::new(0);
        let result: Result<(), AccessError> = layer
            .invoke_with_retry("test.op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BackendError::auth_failure("token expired")) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::AuthFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_and_not_found_propagate_immediately() {
        let layer = layer(3);
        for err in [
            BackendError::malformed("bad filter"),
            BackendError::not_found("no such policy"),
        ] {
            let calls = AtomicU32::new(0);
            let expected = err.kind;
            let result: Result<(), AccessError> = layer
                .invoke_with_retry("test.op", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let err = err.clone();
                    async move { Err(err) }
                })
                .await;
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(result.unwrap_err().kind(), expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_call_times_out_as_unavailable() {
        let layer = AccessLayer::new(
            Arc::new(SnapshotBackend::default()),
            RetryPolicy {
                max_retries: 1,
                base_delay: Duration::from_millis(10),
                call_timeout: Duration::from_secs(5),
            },
        );
        let result: Result<(), AccessError> = layer
            .invoke_with_retry("test.op", || std::future::pending())
            .await;
        assert_eq!(
            result,
            Err(AccessError::Unavailable {
                operation: "test.op".to_string(),
                attempts: 2,
            })
        );
    }
}
