//! Dispatcher tests over real HTTP against a mock authority

use certgate_core::{GatewaySettings, TransportErrorKind};
use certgate_gateway::CertificationGateway;
use hmac::{Hmac, Mac};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sha2::Sha256;
use tests::authorities::*;
use tests::fixtures;
use tests::operations::*;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(base_url: &str, tweak: impl FnOnce(&mut Value)) -> CertificationGateway {
    tests::init_tracing();
    let mut value = fixtures::settings_value(base_url);
    tweak(&mut value);
    let settings: GatewaySettings = serde_json::from_value(value).unwrap();
    CertificationGateway::builder(settings).build().unwrap()
}

#[tokio::test]
async fn test_request_carries_request_id_key_and_json_body() {
    let server = MockServer::start().await;
    let body = fixtures::identity().to_body();
    Mock::given(method("POST"))
        .and(path("/identity/v1/citizens/verify"))
        .and(header_exists("X-Request-Id"))
        .and(header("X-API-Key", "identity-registry-key"))
        .and(header("content-type", "application/json"))
        .and(body_json(&body))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"verified": true})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server.uri(), |_| {});
    let outcome = gateway
        .dispatcher()
        .call(IDENTITY_REGISTRY, VERIFY_CITIZEN, body)
        .await;

    assert_eq!(outcome.payload(), Some(&json!({"verified": true})));
    assert_eq!(outcome.attempts, 1);

    let requests = server.received_requests().await.unwrap();
    let sent_id = requests[0].headers.get("X-Request-Id").unwrap().to_str().unwrap();
    assert_eq!(sent_id, outcome.request_id);
}

#[tokio::test]
async fn test_get_renders_path_and_sends_no_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/applications/LAND-991"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "approved"})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server.uri(), |_| {});
    let outcome = gateway
        .dispatcher()
        .call(LAND_REGISTRY, APPLICATION_STATUS, json!({"reference": "LAND-991"}))
        .await;
    assert_eq!(outcome.payload().unwrap()["status"], "approved");

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].body.is_empty());
}

#[tokio::test]
async fn test_hmac_signature_covers_sent_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/land/v1/deeds/verify"))
        .and(header("X-Key-Id", "land-key"))
        .and(header("X-Signature-Algorithm", "hmac-sha256"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"verified": true})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server.uri(), |v| {
        v["authorities"][2]["auth"] =
            json!({"kind": "hmac", "key_id": "land-key", "secret": "land-secret", "algorithm": "sha256"});
    });
    let outcome = gateway
        .dispatcher()
        .call(
            LAND_REGISTRY,
            VERIFY_OWNERSHIP,
            json!({"deedNumber": "DEED-1", "province": "Lamphun"}),
        )
        .await;
    assert!(outcome.success());

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    let header_value = |name: &str| request.headers.get(name).unwrap().to_str().unwrap().to_string();
    let canonical = format!(
        "POST\n/land/v1/deeds/verify\n{}\n{}",
        header_value("X-Timestamp"),
        String::from_utf8(request.body.clone()).unwrap()
    );
    let mut mac = Hmac::<Sha256>::new_from_slice(b"land-secret").unwrap();
    mac.update(canonical.as_bytes());
    assert_eq!(header_value("X-Signature"), hex::encode(mac.finalize().into_bytes()));
}

#[tokio::test]
async fn test_bearer_token_reused_and_invalidated_on_401() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "agri-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/agri/v1/farms/lookup"))
        .and(header("Authorization", "Bearer agri-token"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/agri/v1/farms/lookup"))
        .and(header("Authorization", "Bearer agri-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"verified": true})))
        .mount(&server)
        .await;

    let token_endpoint = format!("{}/oauth/token", server.uri());
    let gateway = gateway(&server.uri(), |v| {
        v["authorities"][3]["auth"] = json!({
            "kind": "oauth2_client_credentials",
            "token_endpoint": token_endpoint,
            "client_id": "certgate",
            "client_secret": "agri-secret"
        });
    });
    let dispatcher = gateway.dispatcher();

    let rejected = dispatcher
        .call(AGRICULTURE_MINISTRY, FARM_REGISTRATION, json!({}))
        .await;
    assert_eq!(rejected.error().unwrap().code(), "external_authority_error");
    assert_eq!(rejected.attempts, 1);

    // Cached token was dropped, so this call exchanges again
    let accepted = dispatcher
        .call(AGRICULTURE_MINISTRY, FARM_REGISTRATION, json!({}))
        .await;
    assert!(accepted.success());
    assert!(gateway.get_system_health().authentication_status[AGRICULTURE_MINISTRY].token_cached);
}

#[tokio::test]
async fn test_token_failure_makes_no_authority_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/agri/v1/farms/lookup"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let token_endpoint = format!("{}/oauth/token", server.uri());
    let gateway = gateway(&server.uri(), |v| {
        v["authorities"][3]["auth"] = json!({
            "kind": "oauth2_client_credentials",
            "token_endpoint": token_endpoint,
            "client_id": "certgate",
            "client_secret": "agri-secret"
        });
    });

    let outcome = gateway
        .dispatcher()
        .call(AGRICULTURE_MINISTRY, FARM_REGISTRATION, json!({}))
        .await;
    assert_eq!(outcome.error().unwrap().code(), "authentication_error");
    assert_eq!(outcome.attempts, 0);

    let health = gateway.get_system_health();
    assert!(health.authentication_status[AGRICULTURE_MINISTRY]
        .last_refresh_error
        .is_some());
}

#[tokio::test]
async fn test_server_error_retried_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fda/v1/compliance"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fda/v1/compliance"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ACCEPTED"))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server.uri(), |_| {});
    let outcome = gateway
        .dispatcher()
        .call(PRODUCT_SAFETY, COMPLIANCE_REPORT, json!({"applicationId": "APP-1"}))
        .await;

    assert_eq!(outcome.attempts, 3);
    // Non-JSON success bodies are passed on as strings
    assert_eq!(outcome.payload(), Some(&Value::String("ACCEPTED".into())));
}

#[tokio::test]
async fn test_refused_connection_is_classified_and_retried() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let gateway = gateway(&base_url, |_| {});
    let outcome = gateway
        .dispatcher()
        .call(DIGITAL_IDENTITY, VERIFY_IDENTITY, json!({}))
        .await;

    assert_eq!(outcome.attempts, 3);
    assert!(matches!(
        outcome.error(),
        Some(certgate_core::GatewayError::Transport {
            kind: TransportErrorKind::ConnectionRefused,
            ..
        })
    ));
}

#[tokio::test]
async fn test_unknown_operation_makes_no_attempt() {
    let server = MockServer::start().await;
    let gateway = gateway(&server.uri(), |_| {});
    let outcome = gateway
        .dispatcher()
        .call(DIGITAL_IDENTITY, COMPLIANCE_REPORT, json!({}))
        .await;

    assert_eq!(outcome.attempts, 0);
    assert_eq!(outcome.error().unwrap().code(), "configuration_error");
    assert!(server.received_requests().await.unwrap().is_empty());
}
