//! Audit trail entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal classification of an audited operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Partial,
    Failure,
}

/// Append-only audit record, written once per high-level operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub operation_id: Uuid,
    pub action: String,
    pub subject_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub outcome: AuditOutcome,
    pub outcome_summary: String,
    pub elapsed_ms: u64,
}

impl AuditRecord {
    pub fn new(
        operation_id: Uuid,
        action: impl Into<String>,
        subject_ids: Vec<String>,
        outcome: AuditOutcome,
        outcome_summary: impl Into<String>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            operation_id,
            action: action.into(),
            subject_ids,
            timestamp: Utc::now(),
            outcome,
            outcome_summary: outcome_summary.into(),
            elapsed_ms,
        }
    }
}
