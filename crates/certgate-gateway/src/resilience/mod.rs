//! Call resilience: admission control, circuit breaking and retries

mod circuit_breaker;
mod rate_limit;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitPermit};
pub use rate_limit::{RateLimitRule, RateLimiter};
pub use retry::{run_with_retry, RetryOutcome};
