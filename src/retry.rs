use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

use crate::client::ClientError;

/// Bounded-retry settings for remote calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (at least 1).
    pub max_attempts: u32,
    /// Constant wait between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// All attempts at a remote operation failed.
///
/// Carries the last observed failure; whether exhaustion is fatal is the
/// caller's decision.
#[derive(Debug, Error)]
#[error("{operation} failed after {attempts} attempts")]
pub struct RetryExhausted {
    pub operation: &'static str,
    pub attempts: u32,
    #[source]
    pub source: ClientError,
}

/// Run `op`, retrying on any failure with a constant delay between attempts.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= max_attempts {
                    return Err(RetryExhausted {
                        operation,
                        attempts: attempt,
                        source: e,
                    });
                }
                warn!(
                    operation,
                    attempt,
                    delay_secs = policy.delay.as_secs_f64(),
                    error = %e,
                    "Remote call failed, retrying"
                );
                sleep(policy.delay).await;
            }
        }
    }
}
