//! Shared test utilities and fixtures for Certgate integration tests.

pub use certgate_core::{
    AuditOutcome, AuditRecord, GatewayError, GatewayEvent, GatewaySettings, TransportErrorKind,
};
pub use certgate_gateway::{authorities, operations, CertificationGateway};

/// Mock collaborator implementations
pub mod mocks;
pub use mocks::{RecordingAudit, Scripted, ScriptedTransport};

/// Install a test subscriber once; honours RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Event testing utilities
pub mod events {
    use certgate_core::{EventReceiver, GatewayEvent};

    /// Everything emitted so far
    pub fn drain(rx: &mut EventReceiver) -> Vec<GatewayEvent> {
        rx.drain()
    }

    /// Count events of one type
    pub fn count(events: &[GatewayEvent], type_name: &str) -> usize {
        events.iter().filter(|e| e.type_name() == type_name).count()
    }
}

/// Test fixture utilities
pub mod fixtures {
    use certgate_core::{
        ApplicationData, DocumentRef, DocumentsData, GatewaySettings, IdentityData, LandData,
    };
    use serde_json::{json, Value};

    use crate::authorities::*;

    pub const CITIZEN_ID: &str = "1103700012345";

    /// One authority entry with an API key, fast retries and a short timeout
    pub fn authority(name: &str, base_url: &str, operations: Value) -> Value {
        json!({
            "name": name,
            "base_url": base_url,
            "operations": operations,
            "auth": {"kind": "api_key", "key": format!("{}-key", name)},
            "timeout_ms": 1_000,
            "retry": {
                "max_attempts": 3,
                "base_delay_ms": 10,
                "backoff": "exponential"
            }
        })
    }

    /// The five certification authorities, all pointing at `base_url`
    pub fn authorities_json(base_url: &str) -> Vec<Value> {
        let status = json!({"path": "/v1/applications/{reference}", "method": "GET"});
        vec![
            authority(
                IDENTITY_REGISTRY,
                base_url,
                json!({
                    "verify_citizen": "/identity/v1/citizens/verify",
                    "submit_application": "/identity/v1/applications",
                    "application_status": status,
                }),
            ),
            authority(
                DIGITAL_IDENTITY,
                base_url,
                json!({
                    "verify_identity": "/digital/v1/verify",
                    "application_status": status,
                }),
            ),
            authority(
                LAND_REGISTRY,
                base_url,
                json!({
                    "verify_ownership": "/land/v1/deeds/verify",
                    "submit_application": "/land/v1/applications",
                    "application_status": status,
                }),
            ),
            authority(
                AGRICULTURE_MINISTRY,
                base_url,
                json!({
                    "farm_registration": "/agri/v1/farms/lookup",
                    "submit_application": "/agri/v1/applications",
                    "application_status": status,
                    "compliance_report": "/agri/v1/compliance",
                }),
            ),
            authority(
                PRODUCT_SAFETY,
                base_url,
                json!({
                    "submit_application": "/fda/v1/applications",
                    "application_status": status,
                    "compliance_report": "/fda/v1/compliance",
                }),
            ),
        ]
    }

    pub fn settings_value(base_url: &str) -> Value {
        json!({
            "authorities": authorities_json(base_url),
            "default_circuit": {
                "failure_threshold": 3,
                "cooldown_ms": 30_000
            }
        })
    }

    pub fn settings(base_url: &str) -> GatewaySettings {
        serde_json::from_value(settings_value(base_url)).expect("fixture settings")
    }

    pub fn identity() -> IdentityData {
        IdentityData::new(CITIZEN_ID, "Somchai", "Jaidee")
    }

    pub fn land() -> LandData {
        LandData {
            deed_number: "DEED-4411".to_string(),
            province: "Chiang Mai".to_string(),
            district: Some("Mae Rim".to_string()),
            area_rai: Some(12.5),
        }
    }

    pub fn application(targets: &[&str]) -> ApplicationData {
        ApplicationData {
            application_id: "APP-2026-0042".to_string(),
            certification_type: "organic".to_string(),
            applicant: identity(),
            target_authorities: targets.iter().map(|t| t.to_string()).collect(),
            details: json!({"crop": "rice"}),
        }
    }

    pub fn documents() -> DocumentsData {
        DocumentsData {
            documents: vec![DocumentRef {
                document_id: "DOC-1".to_string(),
                kind: "land_deed".to_string(),
                checksum: None,
            }],
        }
    }
}

/// Gateway construction helpers
pub mod harness {
    use std::sync::Arc;

    use certgate_core::{EventBus, EventReceiver, GatewaySettings};
    use certgate_gateway::CertificationGateway;

    use crate::mocks::{RecordingAudit, ScriptedTransport};

    pub struct TestGateway {
        pub gateway: CertificationGateway,
        pub transport: Arc<ScriptedTransport>,
        pub audit: Arc<RecordingAudit>,
        pub events: EventReceiver,
        // Keeps the channel open for the lifetime of the harness
        _bus: EventBus,
    }

    /// Gateway over a scripted transport with recording audit and events
    pub fn scripted(settings: GatewaySettings, transport: ScriptedTransport) -> TestGateway {
        let transport = Arc::new(transport);
        let audit = Arc::new(RecordingAudit::new());
        let bus = EventBus::new();
        let events = bus.subscribe();

        let gateway = CertificationGateway::builder(settings)
            .with_transport(transport.clone())
            .with_http_client(reqwest::Client::new())
            .with_audit(audit.clone())
            .with_events(bus.sender())
            .build()
            .expect("gateway builds");

        TestGateway {
            gateway,
            transport,
            audit,
            events,
            _bus: bus,
        }
    }
}
