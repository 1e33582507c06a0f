//! Certification gateway - the high-level operations
//!
//! Each operation validates its input before any network call, fans out to
//! the relevant authorities through the [`Aggregator`], audits its terminal
//! outcome exactly once and returns an [`OperationResponse`].

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;

use certgate_core::{
    ApplicationData, AuditOutcome, AuditRecord, AuditService, CallOutcome, CircuitStatus,
    DataTransformService, DocumentsData, EndpointHealth, EventSender, GatewayError, GatewayEvent,
    GatewayResult, GatewaySettings, IdentityData, IdentityVerificationOptions, LandData,
    MetricsStore, OperationResponse, OverallStatus, OwnerData, PassthroughTransform, ReportResult,
    ReportType, StatusEntry, StatusReport, SubmissionEntry, SubmissionInputs, SubmissionReport,
    SystemHealth, TokenRefreshSettings, TrackingRef, TracingAuditService, VerificationReport,
};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use super::metrics::InMemoryMetricsStore;
use crate::aggregate::{total_failure, Aggregator, Branch, VerificationCheck};
use crate::auth::AuthProvider;
use crate::dispatch::{AuthorityTransport, Dispatcher, HttpTransport};
use crate::registry::EndpointRegistry;

/// Authority names the operations route to
pub mod authorities {
    pub const IDENTITY_REGISTRY: &str = "identity-registry";
    pub const DIGITAL_IDENTITY: &str = "digital-identity";
    pub const LAND_REGISTRY: &str = "land-registry";
    pub const AGRICULTURE_MINISTRY: &str = "agriculture-ministry";
    pub const PRODUCT_SAFETY: &str = "product-safety";
}

use authorities::*;

/// Operation names looked up in each authority's configuration
pub mod operations {
    pub const VERIFY_CITIZEN: &str = "verify_citizen";
    pub const VERIFY_IDENTITY: &str = "verify_identity";
    pub const VERIFY_OWNERSHIP: &str = "verify_ownership";
    pub const FARM_REGISTRATION: &str = "farm_registration";
    pub const SUBMIT_APPLICATION: &str = "submit_application";
    pub const APPLICATION_STATUS: &str = "application_status";
    pub const COMPLIANCE_REPORT: &str = "compliance_report";
}

use operations::*;

/// Value produced by an operation body, before auditing
struct Settled<T> {
    data: T,
    outcome: AuditOutcome,
    summary: String,
}

pub struct CertificationGateway {
    registry: Arc<EndpointRegistry>,
    auth: Arc<AuthProvider>,
    dispatcher: Arc<Dispatcher>,
    aggregator: Aggregator,
    transform: Arc<dyn DataTransformService>,
    audit: Arc<dyn AuditService>,
    metrics: Arc<dyn MetricsStore>,
    events: EventSender,
    token_refresh: TokenRefreshSettings,
    shutdown: CancellationToken,
}

impl CertificationGateway {
    pub fn builder(settings: GatewaySettings) -> GatewayBuilder {
        GatewayBuilder::new(settings)
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn auth(&self) -> &Arc<AuthProvider> {
        &self.auth
    }

    /// Cancel every in-flight operation; later operations fail with `Cancelled`
    pub fn shutdown(&self) {
        info!("[Gateway] Shutting down");
        self.shutdown.cancel();
    }

    /// Start the background token refresh loop
    pub fn spawn_token_refresh(&self, cancel: CancellationToken) -> JoinHandle<()> {
        Arc::clone(&self.auth).spawn_refresh_task(self.token_refresh.interval(), cancel)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Verify a citizen against the identity registry and, unless disabled,
    /// the digital-identity service.
    pub async fn verify_identity(
        &self,
        identity: &IdentityData,
        options: &IdentityVerificationOptions,
    ) -> GatewayResult<OperationResponse<VerificationReport>> {
        let subject_ids = vec![identity.citizen_id.clone()];
        self.run_operation("verify_identity", subject_ids, |operation_id| {
            self.run_verify_identity(operation_id, identity, options)
        })
        .await
    }

    /// Cross-check a land parcel and its claimed owner across the land
    /// registry, agriculture ministry and identity registry.
    pub async fn verify_land_ownership(
        &self,
        land: &LandData,
        owner: &OwnerData,
    ) -> GatewayResult<OperationResponse<VerificationReport>> {
        let subject_ids = vec![land.deed_number.clone(), owner.citizen_id.clone()];
        self.run_operation("verify_land_ownership", subject_ids, |operation_id| {
            self.run_verify_land_ownership(operation_id, land, owner)
        })
        .await
    }

    /// Submit an application to each of its target authorities concurrently
    pub async fn submit_application(
        &self,
        application: &ApplicationData,
        documents: &DocumentsData,
    ) -> GatewayResult<OperationResponse<SubmissionReport>> {
        let subject_ids = vec![
            application.application_id.clone(),
            application.applicant.citizen_id.clone(),
        ];
        self.run_operation("submit_application", subject_ids, |operation_id| {
            self.run_submit_application(operation_id, application, documents)
        })
        .await
    }

    /// Poll each tracking reference at its authority
    pub async fn check_application_status(
        &self,
        tracking_refs: &[TrackingRef],
    ) -> GatewayResult<OperationResponse<StatusReport>> {
        let subject_ids = tracking_refs.iter().map(|t| t.reference.clone()).collect();
        self.run_operation("check_application_status", subject_ids, |operation_id| {
            self.run_check_application_status(operation_id, tracking_refs)
        })
        .await
    }

    /// Gather compliance sections for an application
    pub async fn generate_compliance_report(
        &self,
        application_id: &str,
        report_type: ReportType,
    ) -> GatewayResult<OperationResponse<ReportResult>> {
        let subject_ids = vec![application_id.to_string()];
        self.run_operation("generate_compliance_report", subject_ids, |operation_id| {
            self.run_generate_compliance_report(operation_id, application_id, report_type)
        })
        .await
    }

    /// Circuit, credential and latency view of every authority
    pub fn get_system_health(&self) -> SystemHealth {
        let breaker = self.dispatcher.breaker();
        let government_endpoints: BTreeMap<String, EndpointHealth> = self
            .registry
            .configs()
            .map(|config| {
                let health = EndpointHealth {
                    base_url: config.base_url.clone(),
                    circuit: breaker.snapshot(&config.name),
                };
                (config.name.clone(), health)
            })
            .collect();
        let performance_metrics = self.metrics.snapshot();

        let health_score = health_score(
            government_endpoints.values().map(|e| e.circuit.status),
            performance_metrics
                .values()
                .map(|m| (m.successes, m.failures)),
        );

        SystemHealth {
            government_endpoints,
            authentication_status: self.auth.status(),
            performance_metrics,
            health_score,
            overall_status: OverallStatus::from_score(health_score),
            checked_at: Utc::now(),
        }
    }

    // ========================================================================
    // Operation bodies
    // ========================================================================

    async fn run_verify_identity(
        &self,
        operation_id: Uuid,
        identity: &IdentityData,
        options: &IdentityVerificationOptions,
    ) -> GatewayResult<Settled<VerificationReport>> {
        identity.validate()?;

        let body = identity.to_body();
        let mut checks = vec![VerificationCheck::new(
            IDENTITY_REGISTRY,
            VERIFY_CITIZEN,
            body.clone(),
            &["citizen_id", "name"],
        )];
        if options.include_digital_identity {
            checks.push(VerificationCheck::new(
                DIGITAL_IDENTITY,
                VERIFY_IDENTITY,
                body,
                &["citizen_id", "name"],
            ));
        }

        let report = self.aggregator.verify(operation_id, &checks, &self.shutdown).await?;
        Ok(verification_settled(report))
    }

    async fn run_verify_land_ownership(
        &self,
        operation_id: Uuid,
        land: &LandData,
        owner: &OwnerData,
    ) -> GatewayResult<Settled<VerificationReport>> {
        land.validate()?;
        owner.validate()?;

        let land_body = json!({
            "deedNumber": land.deed_number,
            "province": land.province,
            "district": land.district,
            "areaRai": land.area_rai,
            "owner": owner.to_body(),
        });
        let checks = vec![
            VerificationCheck::new(
                LAND_REGISTRY,
                VERIFY_OWNERSHIP,
                land_body.clone(),
                &["deed", "owner"],
            ),
            VerificationCheck::new(
                AGRICULTURE_MINISTRY,
                FARM_REGISTRATION,
                land_body,
                &["land_use", "owner"],
            ),
            VerificationCheck::new(IDENTITY_REGISTRY, VERIFY_CITIZEN, owner.to_body(), &["owner"]),
        ];

        let report = self.aggregator.verify(operation_id, &checks, &self.shutdown).await?;
        Ok(verification_settled(report))
    }

    async fn run_submit_application(
        &self,
        operation_id: Uuid,
        application: &ApplicationData,
        documents: &DocumentsData,
    ) -> GatewayResult<Settled<SubmissionReport>> {
        application.validate()?;
        documents.validate()?;
        self.require_registered(&application.target_authorities)?;

        let inputs = SubmissionInputs {
            application,
            documents,
        };
        let mut payloads = self
            .transform
            .transform_for_submission(&inputs, &application.target_authorities)?;

        let mut branches = Vec::with_capacity(application.target_authorities.len());
        for target in &application.target_authorities {
            let payload = payloads.remove(target).ok_or_else(|| {
                GatewayError::Validation(format!("no submission payload for '{}'", target))
            })?;
            branches.push(Branch::new(target.as_str(), SUBMIT_APPLICATION, payload));
        }

        let outcomes = self.aggregator.settle(&branches, &self.shutdown).await?;
        let failed: BTreeSet<String> = failed_authorities(&outcomes);
        if failed.len() == outcomes.len() {
            return Err(total_failure(&outcomes));
        }

        let submissions: BTreeMap<String, SubmissionEntry> = outcomes
            .iter()
            .map(|outcome| {
                let entry = SubmissionEntry {
                    accepted: outcome.success(),
                    tracking_reference: outcome
                        .payload()
                        .and_then(|p| string_field(p, "tracking_reference")),
                    outcome: outcome.summary(),
                    response: outcome.payload().cloned(),
                };
                (outcome.authority.clone(), entry)
            })
            .collect();

        let accepted = outcomes.len() - failed.len();
        let degraded = !failed.is_empty();
        if degraded {
            self.aggregator.report_degraded(
                operation_id,
                &failed,
                accepted as f64 / outcomes.len() as f64,
            );
        }

        Ok(Settled {
            summary: format!("accepted={} failed={}", accepted, failed.len()),
            outcome: partial_if(degraded),
            data: SubmissionReport {
                application_id: application.application_id.clone(),
                submissions,
                accepted,
                failed: failed.len(),
                degraded,
            },
        })
    }

    async fn run_check_application_status(
        &self,
        operation_id: Uuid,
        tracking_refs: &[TrackingRef],
    ) -> GatewayResult<Settled<StatusReport>> {
        if tracking_refs.is_empty() {
            return Err(GatewayError::Validation(
                "at least one tracking reference is required".into(),
            ));
        }
        let mut seen = HashSet::new();
        for tracking in tracking_refs {
            if tracking.reference.trim().is_empty() {
                return Err(GatewayError::Validation("tracking reference is empty".into()));
            }
            if !seen.insert(tracking) {
                return Err(GatewayError::Validation(format!(
                    "duplicate tracking reference '{}' at '{}'",
                    tracking.reference, tracking.authority
                )));
            }
        }
        let authorities: Vec<String> =
            tracking_refs.iter().map(|t| t.authority.clone()).collect();
        self.require_registered(&authorities)?;

        let branches: Vec<Branch> = tracking_refs
            .iter()
            .map(|t| {
                Branch::new(
                    t.authority.as_str(),
                    APPLICATION_STATUS,
                    json!({ "reference": t.reference }),
                )
            })
            .collect();
        let outcomes = self.aggregator.settle(&branches, &self.shutdown).await?;
        if outcomes.iter().all(|o| !o.success()) {
            return Err(total_failure(&outcomes));
        }

        let mut statuses = Vec::new();
        let mut unavailable = Vec::new();
        for (tracking, outcome) in tracking_refs.iter().zip(&outcomes) {
            if !outcome.success() {
                unavailable.push(tracking.clone());
            }
            statuses.push(StatusEntry {
                tracking: tracking.clone(),
                status: outcome.payload().and_then(|p| string_field(p, "status")),
                detail: outcome.payload().cloned(),
                outcome: outcome.summary(),
            });
        }

        let degraded = !unavailable.is_empty();
        if degraded {
            self.aggregator.report_degraded(
                operation_id,
                &failed_authorities(&outcomes),
                (outcomes.len() - unavailable.len()) as f64 / outcomes.len() as f64,
            );
        }

        Ok(Settled {
            summary: format!(
                "resolved={} unavailable={}",
                outcomes.len() - unavailable.len(),
                unavailable.len()
            ),
            outcome: partial_if(degraded),
            data: StatusReport {
                statuses,
                unavailable,
                degraded,
            },
        })
    }

    async fn run_generate_compliance_report(
        &self,
        operation_id: Uuid,
        application_id: &str,
        report_type: ReportType,
    ) -> GatewayResult<Settled<ReportResult>> {
        if application_id.trim().is_empty() {
            return Err(GatewayError::Validation("application_id is required".into()));
        }

        let targets: &[&str] = match report_type {
            ReportType::Safety => &[PRODUCT_SAFETY],
            ReportType::Agricultural => &[AGRICULTURE_MINISTRY],
            ReportType::Full => &[PRODUCT_SAFETY, AGRICULTURE_MINISTRY],
        };
        let body = json!({ "applicationId": application_id, "reportType": report_type });
        let branches: Vec<Branch> = targets
            .iter()
            .map(|authority| Branch::new(*authority, COMPLIANCE_REPORT, body.clone()))
            .collect();

        let outcomes = self.aggregator.settle(&branches, &self.shutdown).await?;
        let missing = failed_authorities(&outcomes);
        if missing.len() == outcomes.len() {
            return Err(total_failure(&outcomes));
        }

        let sections: BTreeMap<String, Value> = outcomes
            .iter()
            .filter_map(|o| o.payload().map(|p| (o.authority.clone(), p.clone())))
            .collect();
        let degraded = !missing.is_empty();
        if degraded {
            self.aggregator.report_degraded(
                operation_id,
                &missing,
                sections.len() as f64 / outcomes.len() as f64,
            );
        }

        Ok(Settled {
            summary: format!("sections={} missing={}", sections.len(), missing.len()),
            outcome: partial_if(degraded),
            data: ReportResult {
                application_id: application_id.to_string(),
                report_type,
                sections,
                missing_authorities: missing,
                degraded,
                generated_at: Utc::now(),
            },
        })
    }

    /// Run an operation body with id generation, tracing, auditing and the
    /// completion event.
    async fn run_operation<T, F, Fut>(
        &self,
        action: &'static str,
        subject_ids: Vec<String>,
        body: F,
    ) -> GatewayResult<OperationResponse<T>>
    where
        F: FnOnce(Uuid) -> Fut,
        Fut: Future<Output = GatewayResult<Settled<T>>>,
    {
        let operation_id = Uuid::new_v4();
        let started = Instant::now();
        let span = info_span!("operation", operation_id = %operation_id, action);

        let result = body(operation_id).instrument(span).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let (outcome, summary) = match &result {
            Ok(settled) => (settled.outcome, settled.summary.clone()),
            Err(e) => (AuditOutcome::Failure, format!("{}: {}", e.code(), e)),
        };
        info!(
            operation_id = %operation_id,
            action,
            outcome = ?outcome,
            elapsed_ms,
            "[Gateway] {} finished: {}",
            action,
            summary
        );

        let record = AuditRecord::new(
            operation_id,
            action,
            subject_ids,
            outcome,
            summary,
            elapsed_ms,
        );
        if let Err(e) = self.audit.create_record(record).await {
            error!(operation_id = %operation_id, error = %e, "[Gateway] Audit write failed");
        }

        self.events.emit(GatewayEvent::OperationCompleted {
            operation_id,
            action: action.to_string(),
            outcome,
            elapsed_ms,
        });

        result.map(|settled| OperationResponse::ok(operation_id, settled.data))
    }

    fn require_registered(&self, authorities: &[String]) -> GatewayResult<()> {
        match authorities.iter().find(|a| !self.registry.contains(a)) {
            Some(unknown) => Err(GatewayError::Validation(format!(
                "unknown authority '{}'",
                unknown
            ))),
            None => Ok(()),
        }
    }
}

fn verification_settled(report: VerificationReport) -> Settled<VerificationReport> {
    Settled {
        summary: format!(
            "verdict={} confidence={:.2} missing={}",
            report.overall_verdict,
            report.confidence,
            report.missing_authorities.len()
        ),
        outcome: partial_if(report.degraded),
        data: report,
    }
}

fn partial_if(degraded: bool) -> AuditOutcome {
    if degraded {
        AuditOutcome::Partial
    } else {
        AuditOutcome::Success
    }
}

fn failed_authorities(outcomes: &[CallOutcome]) -> BTreeSet<String> {
    outcomes
        .iter()
        .filter(|o| !o.success())
        .map(|o| o.authority.clone())
        .collect()
}

fn string_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Circuit score (closed 100, trial 50, open 0) averaged over authorities,
/// scaled by the overall success ratio once calls have settled.
pub fn health_score(
    circuits: impl Iterator<Item = CircuitStatus>,
    call_counts: impl Iterator<Item = (u64, u64)>,
) -> f64 {
    let scores: Vec<f64> = circuits
        .map(|status| match status {
            CircuitStatus::Closed => 100.0,
            CircuitStatus::Trial => 50.0,
            CircuitStatus::Open => 0.0,
        })
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    let circuit_score = scores.iter().sum::<f64>() / scores.len() as f64;

    let (successes, failures) = call_counts.fold((0u64, 0u64), |(s, f), (ds, df)| (s + ds, f + df));
    let settled = successes + failures;
    if settled == 0 {
        circuit_score
    } else {
        circuit_score * successes as f64 / settled as f64
    }
}

/// Builder for [`CertificationGateway`]
///
/// Collaborators not provided fall back to the in-process defaults.
pub struct GatewayBuilder {
    settings: GatewaySettings,
    transport: Option<Arc<dyn AuthorityTransport>>,
    transform: Option<Arc<dyn DataTransformService>>,
    audit: Option<Arc<dyn AuditService>>,
    metrics: Option<Arc<dyn MetricsStore>>,
    http_client: Option<reqwest::Client>,
    events: Option<EventSender>,
}

impl GatewayBuilder {
    pub fn new(settings: GatewaySettings) -> Self {
        Self {
            settings,
            transport: None,
            transform: None,
            audit: None,
            metrics: None,
            http_client: None,
            events: None,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn AuthorityTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn DataTransformService>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditService>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsStore>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Client used for token exchanges
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> GatewayResult<CertificationGateway> {
        let registry = Arc::new(EndpointRegistry::from_settings(&self.settings)?);
        let events = self.events.unwrap_or_else(EventSender::detached);

        let (transport, http_client): (Arc<dyn AuthorityTransport>, reqwest::Client) =
            match (self.transport, self.http_client) {
                (Some(transport), Some(client)) => (transport, client),
                (transport, client) => {
                    let http = HttpTransport::new()?;
                    let client = client.unwrap_or_else(|| http.client());
                    let transport = transport.unwrap_or_else(|| Arc::new(http));
                    (transport, client)
                }
            };

        let auth = Arc::new(AuthProvider::from_registry(
            &registry,
            http_client,
            &self.settings.token_refresh,
            events.clone(),
        ));
        let transform = self
            .transform
            .unwrap_or_else(|| Arc::new(PassthroughTransform));
        let audit = self
            .audit
            .unwrap_or_else(|| Arc::new(TracingAuditService));
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(InMemoryMetricsStore::new()));

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&auth),
            transport,
            Arc::clone(&transform),
            Arc::clone(&metrics),
            events.clone(),
        ));
        let aggregator = Aggregator::new(Arc::clone(&dispatcher), events.clone());

        info!(
            authorities = registry.names().count(),
            "[Gateway] Certification gateway ready"
        );

        Ok(CertificationGateway {
            registry,
            auth,
            dispatcher,
            aggregator,
            transform,
            audit,
            metrics,
            events,
            token_refresh: self.settings.token_refresh,
            shutdown: CancellationToken::new(),
        })
    }
}
