//! Aggregator - concurrent fan-out with settle-all semantics
//!
//! Every branch runs to completion (success or failure); one branch failing
//! never cancels its siblings. Only the caller's [`CancellationToken`] stops
//! the wait. Merged output is keyed by authority, so it does not depend on
//! completion order.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use certgate_core::{
    AuthorityResult, CallOutcome, EventSender, FieldStatus, GatewayError, GatewayEvent,
    GatewayResult, VerificationReport,
};
use futures::future::join_all;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatch::Dispatcher;

/// One dispatcher call in a fan-out
#[derive(Debug, Clone)]
pub struct Branch {
    pub authority: String,
    pub operation: String,
    pub body: Value,
}

impl Branch {
    pub fn new(authority: impl Into<String>, operation: impl Into<String>, body: Value) -> Self {
        Self {
            authority: authority.into(),
            operation: operation.into(),
            body,
        }
    }
}

/// A verification branch and the fields it can vouch for
#[derive(Debug, Clone)]
pub struct VerificationCheck {
    pub branch: Branch,
    pub fields: Vec<String>,
}

impl VerificationCheck {
    pub fn new(
        authority: impl Into<String>,
        operation: impl Into<String>,
        body: Value,
        fields: &[&str],
    ) -> Self {
        Self {
            branch: Branch::new(authority, operation, body),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn authority(&self) -> &str {
        &self.branch.authority
    }
}

pub struct Aggregator {
    dispatcher: Arc<Dispatcher>,
    events: EventSender,
}

impl Aggregator {
    pub fn new(dispatcher: Arc<Dispatcher>, events: EventSender) -> Self {
        Self { dispatcher, events }
    }

    /// Run all branches concurrently and wait for every one to settle.
    /// Outcomes are returned in branch order.
    pub async fn settle(
        &self,
        branches: &[Branch],
        cancel: &CancellationToken,
    ) -> GatewayResult<Vec<CallOutcome>> {
        let calls = join_all(branches.iter().map(|branch| {
            self.dispatcher
                .call(&branch.authority, &branch.operation, branch.body.clone())
        }));

        tokio::select! {
            _ = cancel.cancelled() => {
                warn!(branches = branches.len(), "[Aggregator] Cancelled while waiting");
                Err(GatewayError::Cancelled)
            }
            outcomes = calls => Ok(outcomes),
        }
    }

    /// Fan out verification checks and merge their claims
    pub async fn verify(
        &self,
        operation_id: Uuid,
        checks: &[VerificationCheck],
        cancel: &CancellationToken,
    ) -> GatewayResult<VerificationReport> {
        let mut seen = HashSet::new();
        for check in checks {
            if !seen.insert(check.authority()) {
                return Err(GatewayError::Validation(format!(
                    "authority '{}' listed more than once",
                    check.authority()
                )));
            }
        }

        let branches: Vec<Branch> = checks.iter().map(|c| c.branch.clone()).collect();
        let outcomes = self.settle(&branches, cancel).await?;
        let report = merge(checks, &outcomes)?;

        info!(
            operation_id = %operation_id,
            verdict = report.overall_verdict,
            confidence = report.confidence,
            "[Aggregator] Verification merged"
        );
        if report.degraded {
            self.report_degraded(operation_id, &report.missing_authorities, report.confidence);
        }
        Ok(report)
    }

    /// Emit the degraded-aggregation event
    pub fn report_degraded(&self, operation_id: Uuid, missing: &BTreeSet<String>, confidence: f64) {
        warn!(
            operation_id = %operation_id,
            missing = ?missing,
            confidence,
            "[Aggregator] Degraded result"
        );
        self.events.emit(GatewayEvent::AggregationDegraded {
            operation_id,
            missing_authorities: missing.clone(),
            confidence,
        });
    }
}

/// Error for a fan-out where every branch failed
pub fn total_failure(outcomes: &[CallOutcome]) -> GatewayError {
    GatewayError::AggregationPartialFailure {
        total: outcomes.len(),
        failures: outcomes
            .iter()
            .filter_map(|o| o.error().map(|e| (o.authority.clone(), e.to_string())))
            .collect(),
    }
}

/// The claim a payload makes about one field:
/// `fields.<field>` if boolean, else `verified` if boolean, else none.
pub fn claim(payload: &Value, field: &str) -> Option<bool> {
    payload
        .get("fields")
        .and_then(|fields| fields.get(field))
        .and_then(Value::as_bool)
        .or_else(|| payload.get("verified").and_then(Value::as_bool))
}

/// Merge settled outcomes (in check order) into a report
pub fn merge(
    checks: &[VerificationCheck],
    outcomes: &[CallOutcome],
) -> GatewayResult<VerificationReport> {
    if checks.is_empty() {
        return Err(GatewayError::Validation("no verification checks".into()));
    }

    let total = outcomes.len();
    let successes = outcomes.iter().filter(|o| o.success()).count();
    if successes == 0 {
        return Err(total_failure(outcomes));
    }

    let mut per_authority_results = BTreeMap::new();
    let mut missing_authorities = BTreeSet::new();
    // field -> claims of successful covering branches; None = covered, no claim
    let mut coverage: BTreeMap<&str, Vec<Option<bool>>> = BTreeMap::new();

    for (check, outcome) in checks.iter().zip(outcomes) {
        let mut claims = BTreeMap::new();
        for field in &check.fields {
            let slot = coverage.entry(field.as_str()).or_default();
            if let Some(payload) = outcome.payload() {
                let made = claim(payload, field);
                if let Some(value) = made {
                    claims.insert(field.clone(), value);
                }
                slot.push(made);
            }
        }
        if !outcome.success() {
            missing_authorities.insert(outcome.authority.clone());
        }
        per_authority_results.insert(
            outcome.authority.clone(),
            AuthorityResult {
                outcome: outcome.summary(),
                claims,
            },
        );
    }

    let fields: BTreeMap<String, FieldStatus> = coverage
        .into_iter()
        .map(|(field, claims)| (field.to_string(), field_status(&claims)))
        .collect();

    // Disagreement shows in `fields`; the verdict only falls with confidence 0,
    // which is a total failure above
    Ok(VerificationReport {
        overall_verdict: successes > 0,
        confidence: successes as f64 / total as f64,
        per_authority_results,
        fields,
        degraded: successes < total,
        missing_authorities,
    })
}

fn field_status(claims: &[Option<bool>]) -> FieldStatus {
    if claims.is_empty() {
        return FieldStatus::Unavailable;
    }
    let confirms = claims.iter().any(|c| *c == Some(true));
    let contradicts = claims.iter().any(|c| *c == Some(false));
    match (confirms, contradicts) {
        (true, true) => FieldStatus::Inconsistent,
        (true, false) => FieldStatus::Verified,
        (false, true) => FieldStatus::Mismatch,
        (false, false) => FieldStatus::Unconfirmed,
    }
}
