//! Bounded, cancellable calls to external services.
//!
//! Every outbound call is raced against a timeout and the run's
//! cancellation token. Transient failures (rate limit, overload) are
//! retried with exponential backoff; everything else fails immediately.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ServiceError, ServiceResult, StoreError, StoreResult};
use crate::types::config::RetryPolicy;

/// Why a guarded call did not produce a value.
#[derive(Debug)]
pub enum CallFailure {
    /// The service kept failing (or failed permanently)
    Service { error: ServiceError, attempts: u32 },
    /// The run was cancelled while the call or a backoff sleep was pending
    Cancelled,
}

impl CallFailure {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CallFailure::Service { error, .. } if error.is_rate_limited())
    }
}

/// Run `op` once, bounded by `timeout` and `cancel`.
pub async fn call_once<T, Fut>(
    timeout: Duration,
    cancel: &CancellationToken,
    op: Fut,
) -> Result<T, CallFailure>
where
    Fut: Future<Output = ServiceResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CallFailure::Cancelled),
        result = tokio::time::timeout(timeout, op) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(CallFailure::Service { error, attempts: 1 }),
            Err(_) => Err(CallFailure::Service {
                error: ServiceError::Timeout { after: timeout },
                attempts: 1,
            }),
        },
    }
}

/// Run a store call bounded by `timeout` and `cancel`.
///
/// `None` means the run was cancelled; a timeout becomes a backend error.
pub async fn store_call<T, Fut>(
    timeout: Duration,
    cancel: &CancellationToken,
    op: Fut,
) -> Option<StoreResult<T>>
where
    Fut: Future<Output = StoreResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = tokio::time::timeout(timeout, op) => Some(match result {
            Ok(inner) => inner,
            Err(elapsed) => Err(StoreError::Backend(Box::new(elapsed))),
        }),
    }
}

/// Run `op` with retries for transient failures.
///
/// Makes at most `policy.max_retries + 1` attempts. The delay before retry
/// `n` is the service's `retry_after` hint when present, otherwise
/// `policy.delay_for(n)`; both are capped at `policy.max_delay_ms`.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    timeout: Duration,
    cancel: &CancellationToken,
    operation: &str,
    mut op: F,
) -> Result<T, CallFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let mut attempt: u32 = 0;

    loop {
        let error = match call_once(timeout, cancel, op()).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation, attempt, "Call succeeded after retry");
                }
                return Ok(value);
            }
            Err(CallFailure::Cancelled) => return Err(CallFailure::Cancelled),
            Err(CallFailure::Service { error, .. }) => error,
        };

        if !error.is_transient() || attempt >= policy.max_retries {
            return Err(CallFailure::Service {
                error,
                attempts: attempt + 1,
            });
        }

        let delay = match &error {
            ServiceError::RateLimited {
                retry_after: Some(hint),
            } => (*hint).min(max_delay),
            _ => policy.delay_for(attempt),
        };

        warn!(
            operation,
            attempt = attempt + 1,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient failure, backing off"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CallFailure::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}
