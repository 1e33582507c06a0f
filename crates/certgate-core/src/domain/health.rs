//! System health snapshot types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::authority::AuthKind;

/// Externally visible circuit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    Closed,
    Open,
    Trial,
}

/// Circuit breaker view for one authority
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    pub status: CircuitStatus,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub cooldown_ms: u64,
}

/// Credential state for one authority
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthStatus {
    pub kind: AuthKind,
    pub token_cached: bool,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_refresh_error: Option<String>,
}

/// Call counters and latency for one authority
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuthorityMetrics {
    pub total_calls: u64,
    pub successes: u64,
    pub failures: u64,
    /// Calls refused locally (rate limit, open circuit)
    pub rejections: u64,
    pub average_latency_ms: f64,
    pub max_latency_ms: u64,
    pub last_error: Option<String>,
    pub last_call_at: Option<DateTime<Utc>>,
}

impl AuthorityMetrics {
    pub fn success_rate(&self) -> Option<f64> {
        let settled = self.successes + self.failures;
        if settled == 0 {
            None
        } else {
            Some(self.successes as f64 / settled as f64)
        }
    }
}

/// Endpoint state for one authority
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointHealth {
    pub base_url: String,
    pub circuit: CircuitSnapshot,
}

/// Coarse status derived from the health score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl OverallStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Healthy
        } else if score >= 50.0 {
            Self::Degraded
        } else {
            Self::Unhealthy
        }
    }
}

/// Result of `get_system_health`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemHealth {
    pub government_endpoints: BTreeMap<String, EndpointHealth>,
    pub authentication_status: BTreeMap<String, AuthStatus>,
    pub performance_metrics: BTreeMap<String, AuthorityMetrics>,
    pub health_score: f64,
    pub overall_status: OverallStatus,
    pub checked_at: DateTime<Utc>,
}
