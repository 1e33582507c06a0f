//! Outbound transport
//!
//! [`AuthorityTransport`] is the seam between the dispatcher and the network.
//! [`HttpTransport`] is the reqwest implementation; tests substitute scripted
//! transports.

use std::time::Duration;

use async_trait::async_trait;
use certgate_core::{GatewayError, GatewayResult, HttpMethod, TransportErrorKind};
use dashmap::DashMap;
use tracing::{debug, info};

use crate::auth::TlsIdentity;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// One fully prepared HTTP request
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub authority: String,
    pub operation: String,
    pub request_id: String,
    pub method: HttpMethod,
    pub url: String,
    /// Rendered path, as signed
    pub path: String,
    /// Compact JSON body; not sent for GET
    pub body: String,
    /// Auth headers; `X-Request-Id` is added by the transport
    pub headers: Vec<(String, String)>,
    pub tls: Option<TlsIdentity>,
    pub timeout: Duration,
}

/// Status and body as received
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait AuthorityTransport: Send + Sync {
    /// Send one attempt. Transport-level failures are
    /// [`GatewayError::Transport`]; any HTTP status is a `RawResponse`.
    async fn send(&self, request: &OutboundRequest) -> GatewayResult<RawResponse>;
}

/// reqwest-backed transport. Authorities using mutual TLS get their own
/// client, built on first use and cached by identity.
pub struct HttpTransport {
    client: reqwest::Client,
    tls_clients: DashMap<TlsIdentity, reqwest::Client>,
}

impl HttpTransport {
    pub fn new() -> GatewayResult<Self> {
        let client = Self::builder()
            .build()
            .map_err(|e| GatewayError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            tls_clients: DashMap::new(),
        }
    }

    /// Shared client (also used for token exchanges)
    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }

    fn builder() -> reqwest::ClientBuilder {
        reqwest::Client::builder().user_agent(concat!("certgate/", env!("CARGO_PKG_VERSION")))
    }

    async fn client_for(&self, request: &OutboundRequest) -> GatewayResult<reqwest::Client> {
        let Some(identity) = &request.tls else {
            return Ok(self.client.clone());
        };
        if let Some(client) = self.tls_clients.get(identity) {
            return Ok(client.clone());
        }

        let auth_err = |reason: String| GatewayError::authentication(&request.authority, reason);

        let mut pem = tokio::fs::read(&identity.cert_path)
            .await
            .map_err(|e| auth_err(format!("read {}: {}", identity.cert_path.display(), e)))?;
        let key = tokio::fs::read(&identity.key_path)
            .await
            .map_err(|e| auth_err(format!("read {}: {}", identity.key_path.display(), e)))?;
        pem.push(b'\n');
        pem.extend_from_slice(&key);

        let client_identity = reqwest::Identity::from_pem(&pem)
            .map_err(|e| auth_err(format!("invalid client identity: {}", e)))?;
        let mut builder = Self::builder().identity(client_identity);

        if let Some(ca_path) = &identity.ca_path {
            let ca = tokio::fs::read(ca_path)
                .await
                .map_err(|e| auth_err(format!("read {}: {}", ca_path.display(), e)))?;
            let cert = reqwest::Certificate::from_pem(&ca)
                .map_err(|e| auth_err(format!("invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| auth_err(format!("TLS client: {}", e)))?;
        info!(authority = %request.authority, "[Transport] Built mutual-TLS client");
        self.tls_clients.insert(identity.clone(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl AuthorityTransport for HttpTransport {
    async fn send(&self, request: &OutboundRequest) -> GatewayResult<RawResponse> {
        let client = self.client_for(request).await?;

        let mut builder = match request.method {
            HttpMethod::Get => client.get(&request.url),
            HttpMethod::Post => client.post(&request.url),
            HttpMethod::Put => client.put(&request.url),
        }
        .timeout(request.timeout)
        .header(REQUEST_ID_HEADER, &request.request_id);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if request.method != HttpMethod::Get {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(&request.authority, e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| classify(&request.authority, e))?;

        debug!(
            authority = %request.authority,
            request_id = %request.request_id,
            status,
            "[Transport] Response received"
        );
        Ok(RawResponse { status, body })
    }
}

/// Map a reqwest error onto a transport failure class
fn classify(authority: &str, error: reqwest::Error) -> GatewayError {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_connect() {
        TransportErrorKind::ConnectionRefused
    } else if error.is_request() || error.is_body() {
        TransportErrorKind::ConnectionReset
    } else {
        TransportErrorKind::Network
    };
    GatewayError::transport(authority, kind, error.to_string())
}
