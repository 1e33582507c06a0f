//! Reports returned by the high-level gateway operations

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::outcome::OutcomeSummary;

/// Envelope for every high-level operation result
#[derive(Debug, Clone, Serialize)]
pub struct OperationResponse<T> {
    pub success: bool,
    pub data: T,
    pub operation_id: Uuid,
}

impl<T> OperationResponse<T> {
    pub fn ok(operation_id: Uuid, data: T) -> Self {
        Self {
            success: true,
            data,
            operation_id,
        }
    }
}

/// Merged status of one verified field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    /// At least one successful branch confirmed, none contradicted
    Verified,
    /// Successful branches only contradicted
    Mismatch,
    /// Successful branches disagree
    Inconsistent,
    /// Successful branches covered the field but made no claim
    Unconfirmed,
    /// Every branch covering the field failed
    Unavailable,
}

/// Result of one authority branch inside a verification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorityResult {
    #[serde(flatten)]
    pub outcome: OutcomeSummary,
    /// Field claims made by this branch (`true` confirms, `false` contradicts)
    pub claims: BTreeMap<String, bool>,
}

/// Merged result of a fan-out verification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub overall_verdict: bool,
    pub confidence: f64,
    pub per_authority_results: BTreeMap<String, AuthorityResult>,
    pub fields: BTreeMap<String, FieldStatus>,
    pub degraded: bool,
    pub missing_authorities: BTreeSet<String>,
}

impl VerificationReport {
    pub fn field(&self, name: &str) -> Option<FieldStatus> {
        self.fields.get(name).copied()
    }
}

/// Per-authority submission result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionEntry {
    pub accepted: bool,
    pub tracking_reference: Option<String>,
    #[serde(flatten)]
    pub outcome: OutcomeSummary,
    pub response: Option<Value>,
}

/// Result of submitting one application to its target authorities
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionReport {
    pub application_id: String,
    pub submissions: BTreeMap<String, SubmissionEntry>,
    pub accepted: usize,
    pub failed: usize,
    pub degraded: bool,
}

/// Authority-side reference for a submitted application
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackingRef {
    pub authority: String,
    pub reference: String,
}

impl TrackingRef {
    pub fn new(authority: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            reference: reference.into(),
        }
    }
}

/// Status of one tracked application at one authority
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEntry {
    pub tracking: TrackingRef,
    pub status: Option<String>,
    pub detail: Option<Value>,
    #[serde(flatten)]
    pub outcome: OutcomeSummary,
}

/// Result of polling several tracking references
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub statuses: Vec<StatusEntry>,
    pub unavailable: Vec<TrackingRef>,
    pub degraded: bool,
}

/// Which compliance sections to gather
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Safety,
    Agricultural,
    Full,
}

/// Compliance report assembled from authority sections
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportResult {
    pub application_id: String,
    pub report_type: ReportType,
    pub sections: BTreeMap<String, Value>,
    pub missing_authorities: BTreeSet<String>,
    pub degraded: bool,
    pub generated_at: DateTime<Utc>,
}
