//! Per-call outcome produced by the dispatcher

use serde::Serialize;
use serde_json::Value;

use crate::error::GatewayError;

/// Result of one dispatcher call. Immutable once built.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub authority: String,
    pub operation: String,
    pub result: Result<Value, GatewayError>,
    pub elapsed_ms: u64,
    pub request_id: String,
    /// Network attempts actually made (0 when rejected before sending)
    pub attempts: u32,
}

impl CallOutcome {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn payload(&self) -> Option<&Value> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&GatewayError> {
        self.result.as_ref().err()
    }

    /// Serializable summary for reports
    pub fn summary(&self) -> OutcomeSummary {
        OutcomeSummary {
            authority: self.authority.clone(),
            operation: self.operation.clone(),
            success: self.success(),
            error_code: self.error().map(|e| e.code().to_string()),
            error: self.error().map(|e| e.to_string()),
            elapsed_ms: self.elapsed_ms,
            request_id: self.request_id.clone(),
            attempts: self.attempts,
        }
    }
}

/// Serializable view of a [`CallOutcome`] without the payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeSummary {
    pub authority: String,
    pub operation: String,
    pub success: bool,
    pub error_code: Option<String>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
    pub request_id: String,
    pub attempts: u32,
}
