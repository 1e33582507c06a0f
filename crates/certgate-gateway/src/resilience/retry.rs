//! Retry with backoff
//!
//! Every attempt's outcome is reported to the circuit breaker through the
//! call's [`CircuitPermit`]. Retrying stops early when the error is not
//! retryable for the authority, or when the breaker opened because of this
//! attempt. Trial calls get exactly one attempt.

use std::future::Future;

use certgate_core::{GatewayResult, RetryPolicy};
use tracing::{debug, warn};

use super::circuit_breaker::CircuitPermit;

/// Result of a retried call
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: GatewayResult<T>,
    /// Attempts actually made (>= 1)
    pub attempts: u32,
}

/// Run `attempt` until it succeeds or the policy gives up.
///
/// `attempt` receives the 1-based attempt number.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    permit: &mut CircuitPermit,
    mut attempt: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = GatewayResult<T>>,
{
    let policy = if permit.is_trial() {
        policy.single_attempt()
    } else {
        policy.clone()
    };
    let max_attempts = policy.max_attempts.max(1);
    let mut number = 1;

    loop {
        match attempt(number).await {
            Ok(value) => {
                permit.record_success();
                return RetryOutcome {
                    result: Ok(value),
                    attempts: number,
                };
            }
            Err(e) => {
                let circuit_opened = e.is_attempt_failure() && permit.record_failure();

                if number >= max_attempts || circuit_opened || !e.is_retryable(&policy) {
                    if circuit_opened && number < max_attempts {
                        warn!(
                            authority = permit.authority(),
                            attempt = number,
                            "[Retry] Circuit opened, abandoning retries"
                        );
                    }
                    return RetryOutcome {
                        result: Err(e),
                        attempts: number,
                    };
                }

                let delay = policy.delay_for_retry(number);
                debug!(
                    authority = permit.authority(),
                    attempt = number,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "[Retry] Attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                number += 1;
            }
        }
    }
}
