//! High-level certification operations end to end over a scripted transport

use std::collections::BTreeSet;

use certgate_core::{
    AuditOutcome, FieldStatus, GatewayError, GatewayEvent, HttpMethod, IdentityVerificationOptions,
    OverallStatus, ReportType, TrackingRef, TransportErrorKind,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tests::authorities::*;
use tests::fixtures::{self, CITIZEN_ID};
use tests::harness::{self, TestGateway};
use tests::{events, Scripted, ScriptedTransport};

fn gateway(transport: ScriptedTransport) -> TestGateway {
    harness::scripted(fixtures::settings("https://gov.example"), transport)
}

fn verified() -> Scripted {
    Scripted::ok(json!({"verified": true}))
}

// =============================================================================
// verify_identity
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_verify_identity_happy_path_is_audited_once() {
    let transport = ScriptedTransport::new()
        .always(IDENTITY_REGISTRY, verified())
        .always(DIGITAL_IDENTITY, verified());
    let mut t = gateway(transport);

    let response = t
        .gateway
        .verify_identity(&fixtures::identity(), &IdentityVerificationOptions::default())
        .await
        .unwrap();

    assert!(response.success);
    assert!(response.data.overall_verdict);
    assert_eq!(response.data.confidence, 1.0);
    assert!(!response.data.degraded);
    assert_eq!(response.data.field("citizen_id"), Some(FieldStatus::Verified));

    let records = t.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].operation_id, response.operation_id);
    assert_eq!(records[0].action, "verify_identity");
    assert_eq!(records[0].outcome, AuditOutcome::Success);
    assert_eq!(records[0].subject_ids, vec![CITIZEN_ID.to_string()]);

    let emitted = events::drain(&mut t.events);
    assert_eq!(events::count(&emitted, "call_completed"), 2);
    assert!(emitted.iter().any(|e| matches!(
        e,
        GatewayEvent::OperationCompleted { operation_id, outcome: AuditOutcome::Success, .. }
            if *operation_id == response.operation_id
    )));
}

#[tokio::test(start_paused = true)]
async fn test_verify_identity_without_digital_identity() {
    let transport = ScriptedTransport::new().always(IDENTITY_REGISTRY, verified());
    let t = gateway(transport);

    let options = IdentityVerificationOptions {
        include_digital_identity: false,
    };
    let response = t
        .gateway
        .verify_identity(&fixtures::identity(), &options)
        .await
        .unwrap();

    assert_eq!(response.data.per_authority_results.len(), 1);
    assert_eq!(t.transport.calls(DIGITAL_IDENTITY), 0);

    let sent = &t.transport.requests()[0];
    let body: serde_json::Value = serde_json::from_str(&sent.body).unwrap();
    assert_eq!(body["citizenId"], CITIZEN_ID);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_input_fails_before_any_network_call() {
    let t = gateway(ScriptedTransport::new().always(IDENTITY_REGISTRY, verified()));

    let mut identity = fixtures::identity();
    identity.citizen_id = "12345".to_string();
    let err = t
        .gateway
        .verify_identity(&identity, &IdentityVerificationOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "validation_error");
    assert_eq!(t.transport.total_calls(), 0);
    let records = t.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, AuditOutcome::Failure);
    assert!(records[0].outcome_summary.starts_with("validation_error"));
}

#[tokio::test(start_paused = true)]
async fn test_partial_verification_is_degraded_not_failed() {
    let transport = ScriptedTransport::new()
        .always(IDENTITY_REGISTRY, verified())
        .always(DIGITAL_IDENTITY, Scripted::Fail(TransportErrorKind::Timeout));
    let mut t = gateway(transport);

    let response = t
        .gateway
        .verify_identity(&fixtures::identity(), &IdentityVerificationOptions::default())
        .await
        .unwrap();

    assert!(response.success);
    assert!(response.data.degraded);
    assert_eq!(response.data.confidence, 0.5);
    assert_eq!(t.audit.records()[0].outcome, AuditOutcome::Partial);
    assert_eq!(
        events::count(&events::drain(&mut t.events), "aggregation_degraded"),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_audit_failure_does_not_fail_operation() {
    let transport = ScriptedTransport::new()
        .always(IDENTITY_REGISTRY, verified())
        .always(DIGITAL_IDENTITY, verified());
    let t = gateway(transport);
    t.audit.fail_writes();

    let response = t
        .gateway
        .verify_identity(&fixtures::identity(), &IdentityVerificationOptions::default())
        .await;
    assert!(response.is_ok());
    assert!(t.audit.records().is_empty());
}

// =============================================================================
// verify_land_ownership
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_land_ownership_cross_check() {
    let transport = ScriptedTransport::new()
        .always(
            LAND_REGISTRY,
            Scripted::ok(json!({"fields": {"deed": true, "owner": true}})),
        )
        .always(
            AGRICULTURE_MINISTRY,
            Scripted::ok(json!({"fields": {"land_use": true}})),
        )
        .always(IDENTITY_REGISTRY, verified());
    let t = gateway(transport);

    let response = t
        .gateway
        .verify_land_ownership(&fixtures::land(), &fixtures::identity())
        .await
        .unwrap();
    let report = response.data;

    assert!(report.overall_verdict);
    assert_eq!(report.field("deed"), Some(FieldStatus::Verified));
    assert_eq!(report.field("land_use"), Some(FieldStatus::Verified));
    // Agriculture made no owner claim, the others confirmed
    assert_eq!(report.field("owner"), Some(FieldStatus::Verified));
    assert_eq!(report.per_authority_results.len(), 3);

    let land_request = t
        .transport
        .requests()
        .into_iter()
        .find(|r| r.authority == LAND_REGISTRY)
        .unwrap();
    let body: serde_json::Value = serde_json::from_str(&land_request.body).unwrap();
    assert_eq!(body["deedNumber"], "DEED-4411");
    assert_eq!(body["owner"]["citizenId"], CITIZEN_ID);

    let record = &t.audit.records()[0];
    assert_eq!(record.action, "verify_land_ownership");
    assert_eq!(
        record.subject_ids,
        vec!["DEED-4411".to_string(), CITIZEN_ID.to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_land_owner_mismatch() {
    let transport = ScriptedTransport::new()
        .always(
            LAND_REGISTRY,
            Scripted::ok(json!({"fields": {"deed": true, "owner": false}})),
        )
        .always(AGRICULTURE_MINISTRY, Scripted::status(503))
        .always(IDENTITY_REGISTRY, Scripted::ok(json!({"verified": false})));
    let t = gateway(transport);

    let report = t
        .gateway
        .verify_land_ownership(&fixtures::land(), &fixtures::identity())
        .await
        .unwrap()
        .data;

    // Two of three authorities answered: the verdict stands, the owner
    // contradiction is carried per field
    assert!(report.overall_verdict);
    assert_eq!(report.confidence, 2.0 / 3.0);
    assert_eq!(report.field("owner"), Some(FieldStatus::Mismatch));
    assert_eq!(report.field("land_use"), Some(FieldStatus::Unavailable));
    assert!(report.degraded);
    assert_eq!(
        report.missing_authorities,
        BTreeSet::from([AGRICULTURE_MINISTRY.to_string()])
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_land_area_rejected() {
    let t = gateway(ScriptedTransport::new());
    let mut land = fixtures::land();
    land.area_rai = Some(-3.0);

    let err = t
        .gateway
        .verify_land_ownership(&land, &fixtures::identity())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));
    assert_eq!(t.transport.total_calls(), 0);
}

// =============================================================================
// submit_application
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_submission_partially_accepted() {
    let transport = ScriptedTransport::new()
        .always(
            AGRICULTURE_MINISTRY,
            Scripted::ok(json!({"tracking_reference": "AGRI-2026-17"})),
        )
        .always(PRODUCT_SAFETY, Scripted::Json(422, json!({"error": "missing GMP"})));
    let t = gateway(transport);

    let application = fixtures::application(&[AGRICULTURE_MINISTRY, PRODUCT_SAFETY]);
    let response = t
        .gateway
        .submit_application(&application, &fixtures::documents())
        .await
        .unwrap();
    let report = response.data;

    assert_eq!(report.accepted, 1);
    assert_eq!(report.failed, 1);
    assert!(report.degraded);
    let agri = &report.submissions[AGRICULTURE_MINISTRY];
    assert!(agri.accepted);
    assert_eq!(agri.tracking_reference.as_deref(), Some("AGRI-2026-17"));
    let fda = &report.submissions[PRODUCT_SAFETY];
    assert!(!fda.accepted);
    assert_eq!(fda.outcome.error_code.as_deref(), Some("external_authority_error"));

    let sent = t
        .transport
        .requests()
        .into_iter()
        .find(|r| r.authority == AGRICULTURE_MINISTRY)
        .unwrap();
    let payload: serde_json::Value = serde_json::from_str(&sent.body).unwrap();
    assert_eq!(payload["applicationId"], "APP-2026-0042");
    assert_eq!(payload["documents"][0]["documentId"], "DOC-1");

    let record = &t.audit.records()[0];
    assert_eq!(record.outcome, AuditOutcome::Partial);
    assert_eq!(
        record.subject_ids,
        vec!["APP-2026-0042".to_string(), CITIZEN_ID.to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_submission_all_rejected_is_error() {
    let transport = ScriptedTransport::new()
        .always(AGRICULTURE_MINISTRY, Scripted::status(400))
        .always(PRODUCT_SAFETY, Scripted::status(400));
    let t = gateway(transport);

    let application = fixtures::application(&[AGRICULTURE_MINISTRY, PRODUCT_SAFETY]);
    let err = t
        .gateway
        .submit_application(&application, &fixtures::documents())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "aggregation_partial_failure");
    assert_eq!(t.audit.records()[0].outcome, AuditOutcome::Failure);
}

#[tokio::test(start_paused = true)]
async fn test_submission_to_unknown_authority_rejected() {
    let t = gateway(ScriptedTransport::new());
    let application = fixtures::application(&[AGRICULTURE_MINISTRY, "tax-office"]);

    let err = t
        .gateway
        .submit_application(&application, &fixtures::documents())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(msg) if msg.contains("tax-office")));
    assert_eq!(t.transport.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_submission_duplicate_target_rejected() {
    let t = gateway(ScriptedTransport::new());
    let application = fixtures::application(&[PRODUCT_SAFETY, PRODUCT_SAFETY]);
    assert!(t
        .gateway
        .submit_application(&application, &fixtures::documents())
        .await
        .is_err());
    assert_eq!(t.transport.total_calls(), 0);
}

// =============================================================================
// check_application_status
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_status_polls_each_reference() {
    let transport = ScriptedTransport::new()
        .always(LAND_REGISTRY, Scripted::ok(json!({"status": "under_review"})))
        .always(PRODUCT_SAFETY, Scripted::Fail(TransportErrorKind::ConnectionReset));
    let t = gateway(transport);

    let refs = vec![
        TrackingRef::new(LAND_REGISTRY, "LAND-88"),
        TrackingRef::new(PRODUCT_SAFETY, "FDA 12/7"),
    ];
    let report = t.gateway.check_application_status(&refs).await.unwrap().data;

    assert_eq!(report.statuses.len(), 2);
    assert_eq!(report.statuses[0].status.as_deref(), Some("under_review"));
    assert_eq!(report.statuses[1].status, None);
    assert_eq!(report.unavailable, vec![refs[1].clone()]);
    assert!(report.degraded);

    let land = t
        .transport
        .requests()
        .into_iter()
        .find(|r| r.authority == LAND_REGISTRY)
        .unwrap();
    assert_eq!(land.method, HttpMethod::Get);
    assert_eq!(land.path, "/v1/applications/LAND-88");
    assert!(land.body.is_empty());

    let fda = t
        .transport
        .requests()
        .into_iter()
        .find(|r| r.authority == PRODUCT_SAFETY)
        .unwrap();
    assert_eq!(fda.path, "/v1/applications/FDA%2012%2F7");
}

#[tokio::test(start_paused = true)]
async fn test_status_rejects_empty_and_duplicate_refs() {
    let t = gateway(ScriptedTransport::new());

    assert_eq!(
        t.gateway.check_application_status(&[]).await.unwrap_err().code(),
        "validation_error"
    );

    let duplicate = vec![
        TrackingRef::new(LAND_REGISTRY, "LAND-1"),
        TrackingRef::new(LAND_REGISTRY, "LAND-1"),
    ];
    assert_eq!(
        t.gateway
            .check_application_status(&duplicate)
            .await
            .unwrap_err()
            .code(),
        "validation_error"
    );
    assert_eq!(t.transport.total_calls(), 0);
    assert_eq!(t.audit.records().len(), 2);
}

// =============================================================================
// generate_compliance_report
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_full_report_gathers_both_sections() {
    let transport = ScriptedTransport::new()
        .always(PRODUCT_SAFETY, Scripted::ok(json!({"gmp": "pass"})))
        .always(AGRICULTURE_MINISTRY, Scripted::ok(json!({"gap": "pass"})));
    let t = gateway(transport);

    let report = t
        .gateway
        .generate_compliance_report("APP-9", ReportType::Full)
        .await
        .unwrap()
        .data;

    assert_eq!(report.sections.len(), 2);
    assert_eq!(report.sections[PRODUCT_SAFETY], json!({"gmp": "pass"}));
    assert!(report.missing_authorities.is_empty());
    assert!(!report.degraded);

    let body: serde_json::Value =
        serde_json::from_str(&t.transport.requests()[0].body).unwrap();
    assert_eq!(body, json!({"applicationId": "APP-9", "reportType": "full"}));
}

#[tokio::test(start_paused = true)]
async fn test_safety_report_only_calls_product_safety() {
    let transport = ScriptedTransport::new().always(PRODUCT_SAFETY, Scripted::ok(json!({})));
    let t = gateway(transport);

    let report = t
        .gateway
        .generate_compliance_report("APP-9", ReportType::Safety)
        .await
        .unwrap()
        .data;
    assert_eq!(report.sections.keys().collect::<Vec<_>>(), vec![PRODUCT_SAFETY]);
    assert_eq!(t.transport.calls(AGRICULTURE_MINISTRY), 0);
}

#[tokio::test(start_paused = true)]
async fn test_report_requires_application_id() {
    let t = gateway(ScriptedTransport::new());
    let err = t
        .gateway
        .generate_compliance_report("  ", ReportType::Agricultural)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "validation_error");
}

// =============================================================================
// Lifecycle and health
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_operations() {
    let transport = ScriptedTransport::new()
        .always(IDENTITY_REGISTRY, Scripted::Hang)
        .always(DIGITAL_IDENTITY, Scripted::Hang);
    let t = gateway(transport);
    t.gateway.shutdown();

    let err = t
        .gateway
        .verify_identity(&fixtures::identity(), &IdentityVerificationOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::Cancelled);
    assert_eq!(t.audit.records()[0].outcome, AuditOutcome::Failure);
}

#[tokio::test(start_paused = true)]
async fn test_operation_ids_are_unique() {
    let transport = ScriptedTransport::new().always(IDENTITY_REGISTRY, verified());
    let t = gateway(transport);
    let options = IdentityVerificationOptions {
        include_digital_identity: false,
    };

    let a = t.gateway.verify_identity(&fixtures::identity(), &options).await.unwrap();
    let b = t.gateway.verify_identity(&fixtures::identity(), &options).await.unwrap();
    assert_ne!(a.operation_id, b.operation_id);
    assert_eq!(t.audit.records().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_system_health_reflects_open_circuit() {
    let transport = ScriptedTransport::new()
        .always(IDENTITY_REGISTRY, verified())
        .always(DIGITAL_IDENTITY, Scripted::Fail(TransportErrorKind::ConnectionRefused));
    let t = gateway(transport);

    let fresh = t.gateway.get_system_health();
    assert_eq!(fresh.health_score, 100.0);
    assert_eq!(fresh.overall_status, OverallStatus::Healthy);
    assert_eq!(fresh.government_endpoints.len(), 5);
    assert_eq!(fresh.authentication_status.len(), 5);

    t.gateway
        .verify_identity(&fixtures::identity(), &IdentityVerificationOptions::default())
        .await
        .unwrap();

    let health = t.gateway.get_system_health();
    // Four of five circuits closed (80), scaled by one success in two calls
    assert_eq!(health.health_score, 40.0);
    assert_eq!(
        health.government_endpoints[DIGITAL_IDENTITY].circuit.status,
        certgate_core::CircuitStatus::Open
    );
    assert_eq!(health.performance_metrics[IDENTITY_REGISTRY].successes, 1);
    assert_eq!(health.performance_metrics[DIGITAL_IDENTITY].failures, 1);
}
