//! Gateway events
//!
//! Lifecycle notifications written by the dispatcher, breaker, auth provider
//! and aggregator to the injected event sink. Events are facts that already
//! happened; consumers decide which ones they care about.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::audit::AuditOutcome;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// A dispatcher call settled
    CallCompleted {
        authority: String,
        operation: String,
        request_id: String,
        success: bool,
        attempts: u32,
        elapsed_ms: u64,
        error_code: Option<String>,
    },

    /// Failure threshold reached or a trial failed
    CircuitOpened {
        authority: String,
        consecutive_failures: u32,
        cooldown_ms: u64,
        opened_at: DateTime<Utc>,
    },

    /// Cooldown elapsed and a trial call was admitted
    CircuitTrial { authority: String },

    /// Trial succeeded
    CircuitClosed { authority: String },

    /// Admission denied by the rate window
    RateLimited { authority: String },

    TokenRefreshed {
        authority: String,
        expires_at: Option<DateTime<Utc>>,
    },

    TokenRefreshFailed { authority: String, reason: String },

    /// Some fan-out branches failed but the operation still produced a result
    AggregationDegraded {
        operation_id: Uuid,
        missing_authorities: BTreeSet<String>,
        confidence: f64,
    },

    /// A high-level operation finished (and was audited)
    OperationCompleted {
        operation_id: Uuid,
        action: String,
        outcome: AuditOutcome,
        elapsed_ms: u64,
    },
}

impl GatewayEvent {
    /// Get the event type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::CallCompleted { .. } => "call_completed",
            Self::CircuitOpened { .. } => "circuit_opened",
            Self::CircuitTrial { .. } => "circuit_trial",
            Self::CircuitClosed { .. } => "circuit_closed",
            Self::RateLimited { .. } => "rate_limited",
            Self::TokenRefreshed { .. } => "token_refreshed",
            Self::TokenRefreshFailed { .. } => "token_refresh_failed",
            Self::AggregationDegraded { .. } => "aggregation_degraded",
            Self::OperationCompleted { .. } => "operation_completed",
        }
    }

    /// Authority this event concerns, if any
    pub fn authority(&self) -> Option<&str> {
        match self {
            Self::CallCompleted { authority, .. }
            | Self::CircuitOpened { authority, .. }
            | Self::CircuitTrial { authority }
            | Self::CircuitClosed { authority }
            | Self::RateLimited { authority }
            | Self::TokenRefreshed { authority, .. }
            | Self::TokenRefreshFailed { authority, .. } => Some(authority),
            _ => None,
        }
    }
}
