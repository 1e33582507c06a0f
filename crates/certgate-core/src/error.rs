//! Gateway error taxonomy
//!
//! Every failure a gateway call can produce. Errors are `Clone` because they
//! are stored inside [`CallOutcome`](crate::CallOutcome) and copied into
//! reports and audit summaries.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{RetryPolicy, RetryableCode};

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Low-level transport failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// The per-authority timeout elapsed
    Timeout,
    /// Connection dropped mid-request
    ConnectionReset,
    /// Could not connect at all
    ConnectionRefused,
    /// Anything else reqwest reports
    Network,
}

impl TransportErrorKind {
    /// The retry code that matches this transport failure
    pub fn retry_code(self) -> RetryableCode {
        match self {
            Self::Timeout => RetryableCode::Timeout,
            Self::ConnectionReset => RetryableCode::ConnectionReset,
            Self::ConnectionRefused => RetryableCode::ConnectionRefused,
            Self::Network => RetryableCode::Network,
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::ConnectionReset => "connection reset",
            Self::ConnectionRefused => "connection refused",
            Self::Network => "network error",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by the gateway
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// Malformed caller input, raised before any network call
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown authority/operation or invalid settings
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Credential or token failure (never retried)
    #[error("authentication with {authority} failed: {reason}")]
    Authentication { authority: String, reason: String },

    /// Admission denied by the per-authority rate window
    #[error("rate limit exceeded for {authority}")]
    RateLimitExceeded { authority: String },

    /// Authority quarantined by its circuit breaker; no network attempt was made
    #[error("circuit open for {authority} (retry in {retry_after_ms}ms)")]
    CircuitOpen { authority: String, retry_after_ms: u64 },

    /// Network-level failure or timeout
    #[error("{kind} calling {authority}: {message}")]
    Transport {
        authority: String,
        kind: TransportErrorKind,
        message: String,
    },

    /// Authority answered with an error status
    #[error("{authority} returned HTTP {status}")]
    ExternalAuthority {
        authority: String,
        status: u16,
        body: String,
    },

    /// Fan-out where branches failed; only surfaced as an error when every branch failed
    #[error("{} of {total} branches failed", failures.len())]
    AggregationPartialFailure {
        total: usize,
        failures: BTreeMap<String, String>,
    },

    /// Caller cancelled the operation while waiting
    #[error("operation cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Stable snake_case identifier used in metrics, reports and audit records
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Configuration(_) => "configuration_error",
            Self::Authentication { .. } => "authentication_error",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Transport { .. } => "transport_error",
            Self::ExternalAuthority { .. } => "external_authority_error",
            Self::AggregationPartialFailure { .. } => "aggregation_partial_failure",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the retry executor may re-attempt after this error.
    ///
    /// Only transport failures and authority statuses listed in the
    /// authority's retryable codes qualify.
    pub fn is_retryable(&self, policy: &RetryPolicy) -> bool {
        match self {
            Self::Transport { kind, .. } => policy.retryable_codes.contains(&kind.retry_code()),
            Self::ExternalAuthority { status, .. } => {
                policy.retryable_codes.contains(&RetryableCode::Status(*status))
            }
            _ => false,
        }
    }

    /// Whether this error came from an actual attempt against the authority
    /// (and therefore counts for the circuit breaker).
    pub fn is_attempt_failure(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::ExternalAuthority { .. })
    }

    /// Authority the error relates to, if any
    pub fn authority(&self) -> Option<&str> {
        match self {
            Self::Authentication { authority, .. }
            | Self::RateLimitExceeded { authority }
            | Self::CircuitOpen { authority, .. }
            | Self::Transport { authority, .. }
            | Self::ExternalAuthority { authority, .. } => Some(authority),
            _ => None,
        }
    }

    pub fn transport(
        authority: impl Into<String>,
        kind: TransportErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            authority: authority.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn authentication(authority: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Authentication {
            authority: authority.into(),
            reason: reason.into(),
        }
    }
}
